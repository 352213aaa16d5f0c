use crate::client::{BufferedService, map_buffer_error};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{HttpResponse, ResponseBody};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use http_body_util::Full;
use serde::Serialize;
use tower::{Service, ServiceExt};

#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Json(Bytes),
    Form(Bytes),
}

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::get`](crate::HttpClient::get) and friends.
/// Header errors are captured and reported by [`send()`](RequestBuilder::send).
///
/// ```ignore
/// let resp = client
///     .post("https://abap.example.com/sap/bc/lrep/dta_folder/?name=app.var")
///     .header("content-type", "application/octet-stream")
///     .body_bytes(archive)
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    method: http::Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: BodyKind,
    error: Option<HttpError>,
    transport_security: TransportSecurity,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        method: http::Method,
        url: String,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            max_body_size,
            method,
            url,
            headers: Vec::new(),
            body: BodyKind::Empty,
            error: None,
            transport_security,
        }
    }

    /// Add a single header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Add an already validated header (e.g. one marked sensitive)
    pub fn typed_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Add multiple headers to the request
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name.as_ref(), value.as_ref());
            if self.error.is_some() {
                break;
            }
        }
        self
    }

    /// Set request body as JSON
    ///
    /// Sets `Content-Type: application/json` unless one was provided.
    ///
    /// # Errors
    ///
    /// Returns a deferred header error or `HttpError::Json` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        self.body = BodyKind::Json(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Set request body as form URL-encoded
    ///
    /// Sets `Content-Type: application/x-www-form-urlencoded` unless one was provided.
    ///
    /// # Errors
    ///
    /// Returns a deferred header error or `HttpError::FormEncode` if encoding fails.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        self.body = BodyKind::Form(Bytes::from(serde_urlencoded::to_string(fields)?));
        Ok(self)
    }

    /// Set request body as raw bytes
    pub fn body_bytes(mut self, body: Bytes) -> Self {
        self.body = BodyKind::Bytes(body);
        self
    }

    /// Set request body as a string
    pub fn body_string(mut self, body: String) -> Self {
        self.body = BodyKind::Bytes(Bytes::from(body));
        self
    }

    fn validate_url(&self) -> Result<http::Uri, HttpError> {
        let uri: http::Uri =
            self.url
                .parse()
                .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                    url: self.url.clone(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(uri),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    /// Send the request and return the response
    ///
    /// Every HTTP status is returned as `Ok`; use
    /// [`HttpResponse::error_for_status`] or the checked body readers to turn
    /// non-2xx into errors. Interceptors may still reject a response with
    /// [`HttpError::Intercepted`].
    ///
    /// # Errors
    ///
    /// Returns `HttpError` for invalid headers/URL, transport failures,
    /// timeouts and interceptor rejections.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let uri = self.validate_url()?;
        let mut builder = Request::builder().method(self.method).uri(uri);

        let has_content_type = self
            .headers
            .iter()
            .any(|(name, _)| name == http::header::CONTENT_TYPE);
        if !has_content_type {
            match &self.body {
                BodyKind::Json(_) => {
                    builder = builder.header(http::header::CONTENT_TYPE, "application/json");
                }
                BodyKind::Form(_) => {
                    builder = builder.header(
                        http::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    );
                }
                BodyKind::Empty | BodyKind::Bytes(_) => {}
            }
        }

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        let body_bytes = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) | BodyKind::Json(b) | BodyKind::Form(b) => b,
        };

        let request = builder.body(Full::new(body_bytes))?;

        let inner: Response<ResponseBody> = self
            .service
            .ready()
            .await
            .map_err(map_buffer_error)?
            .call(request)
            .await
            .map_err(map_buffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::{HttpClient, HttpError, InvalidUriKind};
    use httpmock::prelude::*;

    fn client(insecure: bool) -> HttpClient {
        let builder = HttpClient::builder();
        let builder = if insecure {
            builder.allow_insecure_http()
        } else {
            builder
        };
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_relative_url_rejected() {
        let err = client(true).get("/sap/bc/lrep").send().await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::MissingAuthority,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_http_rejected_when_tls_only() {
        let err = client(false)
            .get("http://abap.example.com/sap/bc/lrep")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { ref scheme, .. } if scheme == "http"));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_rejected() {
        let err = client(true)
            .get("ftp://abap.example.com/file")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));
    }

    #[tokio::test]
    async fn test_invalid_header_deferred_to_send() {
        let result = client(true)
            .get("http://abap.example.com/")
            .header("bad header", "x")
            .header("accept", "application/json")
            .send()
            .await;
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
    }

    #[tokio::test]
    async fn test_invalid_header_reported_by_json() {
        let result = client(true)
            .post("http://abap.example.com/")
            .header("x-value", "bad\x00value")
            .json(&serde_json::json!({}));
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[tokio::test]
    async fn test_json_body_sets_content_type() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/json")
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"name": "app"}));
            then.status(201);
        });

        let resp = client(true)
            .post(&format!("{}/json", server.base_url()))
            .json(&serde_json::json!({"name": "app"}))
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), http::StatusCode::CREATED);
        m.assert();
    }

    #[tokio::test]
    async fn test_explicit_content_type_wins() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/atom")
                .header("content-type", "application/atom+xml");
            then.status(201);
        });

        client(true)
            .post(&format!("{}/atom", server.base_url()))
            .headers([("content-type", "application/atom+xml")])
            .body_string("<entry/>".to_owned())
            .send()
            .await
            .unwrap();
        m.assert();
    }
}
