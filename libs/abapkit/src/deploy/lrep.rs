use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;

use super::messages;
use crate::connection::CSRF_HEADER;
use crate::error::AbapError;
use crate::odata::{ODataResponse, ODataService, RequestOptions};
use crate::provider::{AbapService, Lookup};

const DTA_FOLDER: &str = "/dta_folder/";
pub const DEFAULT_LAYER: &str = "CUSTOMER_BASE";
/// Local package; its objects cannot be recorded on a transport.
pub const LOCAL_PACKAGE: &str = "$TMP";

/// Where a descriptor variant lives in the layered repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    /// Full repository path.
    Path(String),
    /// Variant `id` of the application `reference`.
    Variant { reference: String, id: String },
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Path(path) => f.write_str(path),
            Namespace::Variant { reference, id } => write!(f, "apps/{reference}/appVariants/{id}/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LrepDeployConfig {
    pub namespace: Namespace,
    pub layer: Option<String>,
    /// Defaults to `$TMP`.
    pub package: Option<String>,
    pub transport: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LrepUndeployConfig {
    pub namespace: Namespace,
    pub layer: Option<String>,
    pub transport: Option<String>,
}

/// `/sap/bc/lrep`: stores app descriptor variants of adaptation projects.
#[derive(Debug)]
pub struct LayeredRepositoryService {
    odata: Arc<ODataService>,
}

impl AbapService for LayeredRepositoryService {
    fn from_odata(odata: Arc<ODataService>) -> Self {
        Self { odata }
    }

    fn odata(&self) -> &Arc<ODataService> {
        &self.odata
    }
}

fn log_result(response: &ODataResponse, fallback: &str) {
    messages::log_lrep_response(&response.text(), fallback);
}

fn log_failure(err: &AbapError, action: &str) {
    match err.body_preview() {
        Some(body) => messages::log_lrep_response(body, &format!("{action} failed: {err}")),
        None => tracing::error!(error = %err, "{action} failed"),
    }
}

impl LayeredRepositoryService {
    pub const PATH: &'static str = "/sap/bc/lrep";

    /// Request a CSRF token for the session.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` if the request fails.
    pub async fn get_csrf_token(&self) -> Result<(), AbapError> {
        let response = self
            .odata
            .get(
                "/actions/getcsrftoken/",
                RequestOptions::new().header(CSRF_HEADER, "Fetch").raw(),
            )
            .await?;
        if !self
            .odata
            .connection()
            .state()
            .capture_csrf_token(&response.headers)
        {
            tracing::debug!("no new CSRF token issued");
        }
        Ok(())
    }

    /// Whether a variant exists at `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` for failures other than 404.
    pub async fn is_existing_variant(&self, namespace: &Namespace) -> Result<Lookup<()>, AbapError> {
        let options = RequestOptions::new()
            .param("name", namespace.to_string())
            .param("layer", DEFAULT_LAYER)
            .param("timestamp", Utc::now().timestamp_millis().to_string())
            .raw();
        match self.odata.get(DTA_FOLDER, options).await {
            Ok(_) => Ok(Lookup::Found(())),
            Err(err) if err.is_not_found() => Ok(Lookup::NotFound),
            Err(err) => Err(err),
        }
    }

    /// Upload a variant archive, replacing an existing variant.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` if any request fails.
    pub async fn deploy(
        &self,
        archive: Bytes,
        config: &LrepDeployConfig,
    ) -> Result<ODataResponse, AbapError> {
        self.get_csrf_token().await?;
        let exists = self.is_existing_variant(&config.namespace).await?.is_found();

        let package = config
            .package
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(LOCAL_PACKAGE);
        let mut options = RequestOptions::new()
            .param("name", config.namespace.to_string())
            .param("layer", config.layer.as_deref().unwrap_or(DEFAULT_LAYER))
            .param("package", package)
            .header("content-type", "application/octet-stream");
        if package != LOCAL_PACKAGE
            && let Some(transport) = config.transport.as_deref().filter(|t| !t.is_empty())
        {
            options = options.param("changelist", transport);
        }

        tracing::info!(namespace = %config.namespace, update = exists, "deploying variant");
        let result = if exists {
            self.odata.put(DTA_FOLDER, archive, options).await
        } else {
            self.odata.post(DTA_FOLDER, archive, options).await
        };
        match result {
            Ok(response) => {
                log_result(&response, "deployment successful");
                Ok(response)
            }
            Err(err) => {
                log_failure(&err, "deployment");
                Err(err)
            }
        }
    }

    /// Delete a variant.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::NotFound` without deleting anything if the
    /// variant does not exist, otherwise `AbapError` for failed requests.
    pub async fn undeploy(&self, config: &LrepUndeployConfig) -> Result<ODataResponse, AbapError> {
        if !self.is_existing_variant(&config.namespace).await?.is_found() {
            return Err(AbapError::NotFound(format!(
                "variant {} does not exist",
                config.namespace
            )));
        }

        let mut options = RequestOptions::new()
            .param("namespace", config.namespace.to_string())
            .param("layer", config.layer.as_deref().unwrap_or(DEFAULT_LAYER));
        if let Some(transport) = config.transport.as_deref().filter(|t| !t.is_empty()) {
            options = options.param("changelist", transport);
        }

        match self.odata.delete(DTA_FOLDER, options).await {
            Ok(response) => {
                log_result(&response, "undeployment successful");
                Ok(response)
            }
            Err(err) => {
                log_failure(&err, "undeployment");
                Err(err)
            }
        }
    }

    /// Merged app descriptor of a variant archive, without storing it.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` if the request fails or the answer is not JSON.
    pub async fn merge_app_descriptor_variant(&self, archive: Bytes) -> Result<Value, AbapError> {
        let options = RequestOptions::new()
            .param("sap-language", "EN")
            .header("content-type", "application/zip");
        let response = self
            .odata
            .put("/appdescr_variant_preview/", archive, options)
            .await?;
        response.json()
    }
}
