use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use tokio::sync::OnceCell;
use url::Url;

use super::{ODataResponse, RequestOptions, ServiceDocument};
use crate::connection::Connection;
use crate::error::AbapError;

/// Registry key of a service: leading slash, no trailing slash, empty for
/// the root.
#[must_use]
pub fn mount_path(path: &str) -> String {
    match path.trim_matches('/') {
        "" => String::new(),
        trimmed => format!("/{trimmed}"),
    }
}

/// An OData service mounted at a path below the connection's base URL.
///
/// The service document and `$metadata` are fetched on first use and kept
/// for the lifetime of the instance.
#[derive(Debug)]
pub struct ODataService {
    conn: Arc<Connection>,
    path: String,
    document: OnceCell<ServiceDocument>,
    metadata: OnceCell<String>,
}

impl ODataService {
    pub(crate) fn new(conn: Arc<Connection>, path: &str) -> Self {
        Self {
            conn,
            path: mount_path(path),
            document: OnceCell::new(),
            metadata: OnceCell::new(),
        }
    }

    /// Mount path, without a trailing slash.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Absolute URL of `resource` below the service root.
    #[must_use]
    pub fn url(&self, resource: &str, params: &[(String, String)]) -> Url {
        self.conn.url(&format!("{}{resource}", self.path), params)
    }

    /// GET `resource`, asking for JSON unless `options` request another format.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::Http` for transport failures and non-2xx statuses
    /// (with a body preview) and `AbapError::Connection` when the session
    /// check rejects the response.
    pub async fn get(
        &self,
        resource: &str,
        options: RequestOptions,
    ) -> Result<ODataResponse, AbapError> {
        let options = if options.wants_json() {
            options.force_json()
        } else {
            options
        };
        self.send(Method::GET, resource, None, options).await
    }

    /// POST `body` to `resource`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn post(
        &self,
        resource: &str,
        body: Bytes,
        options: RequestOptions,
    ) -> Result<ODataResponse, AbapError> {
        self.send(Method::POST, resource, Some(body), options).await
    }

    /// PUT `body` to `resource`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn put(
        &self,
        resource: &str,
        body: Bytes,
        options: RequestOptions,
    ) -> Result<ODataResponse, AbapError> {
        self.send(Method::PUT, resource, Some(body), options).await
    }

    /// DELETE `resource`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn delete(
        &self,
        resource: &str,
        options: RequestOptions,
    ) -> Result<ODataResponse, AbapError> {
        self.send(Method::DELETE, resource, None, options).await
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        body: Option<Bytes>,
        options: RequestOptions,
    ) -> Result<ODataResponse, AbapError> {
        let url = self.url(resource, &options.params);
        tracing::debug!(method = %method, url = %url, "OData request");

        let mut request = self
            .conn
            .client()
            .request(method, url.as_str())
            .headers(options.headers);
        if let Some(body) = body {
            request = request.body_bytes(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.checked_bytes().await?;

        Ok(ODataResponse {
            status,
            headers,
            body,
        })
    }

    /// Entity sets of the service root, fetched once.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus `AbapError::OData` for an error payload.
    pub async fn document(&self) -> Result<&ServiceDocument, AbapError> {
        self.document
            .get_or_try_init(|| async {
                let response = self.get("/", RequestOptions::new()).await?;
                let document = ServiceDocument::from_json(&response.odata()?);
                tracing::debug!(
                    service = %self.path,
                    entity_sets = document.entity_sets.len(),
                    "loaded service document"
                );
                Ok(document)
            })
            .await
    }

    /// Raw `$metadata` XML, fetched once.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn metadata(&self) -> Result<&str, AbapError> {
        self.metadata
            .get_or_try_init(|| async {
                let response = self
                    .get(
                        "/$metadata",
                        RequestOptions::new()
                            .header("accept", "application/xml")
                            .raw(),
                    )
                    .await?;
                Ok(response.text())
            })
            .await
            .map(String::as_str)
    }
}
