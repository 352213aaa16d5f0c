//! One backend session: HTTP client, interceptor chain and shared state.
//!
//! Interceptors in request order (responses travel back in reverse):
//!
//! 1. basic auth, while credentials are held
//! 2. bearer token or reentrance ticket, if configured
//! 3. CSRF: `x-csrf-token: Fetch` on the first request, the captured token afterwards
//! 4. validation of the first response (status, SAML fallback, login page detection)
//! 5. cookies, always

mod basic_auth;
pub mod cookies;
mod csrf;
pub mod sniff;
mod validation;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Request, Response};
use http_body_util::Full;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use url::Url;

use abapkit_auth::{BearerAuthLayer, TicketAuthLayer, TokenSource};
use abapkit_http::{
    DEFAULT_USER_AGENT, HttpClient, HttpClientBuilder, HttpClientConfig, HttpError, OneShot,
    ResponseBody,
};
use abapkit_utils::SecretString;

use crate::config::{BasicAuth, ProviderConfig};
use crate::error::AbapError;

pub use basic_auth::BasicAuthLayer;
pub use cookies::{CookieJar, CookieLayer};
pub use csrf::CsrfLayer;
pub use validation::ValidationLayer;

/// Request and response headers carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Query parameter that turns off SAML redirects on the backend.
pub const SAML_PARAM: &str = "saml2";

pub(crate) type HttpRequest = Request<Full<Bytes>>;
pub(crate) type HttpResult = Result<Response<ResponseBody>, HttpError>;
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = HttpResult> + Send>>;

/// Mutable state shared by every request of one provider.
///
/// Locks are never held across an `.await`.
#[derive(Debug, Default)]
pub struct ConnectionState {
    cookies: Mutex<CookieJar>,
    csrf_token: Mutex<Option<HeaderValue>>,
    credentials: Mutex<Option<BasicAuth>>,
    saml_disabled: AtomicBool,
    pub(crate) csrf_fetch: OneShot,
    pub(crate) validation: OneShot,
    pub(crate) credentials_released: OneShot,
}

impl ConnectionState {
    #[must_use]
    pub fn new(credentials: Option<BasicAuth>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
            ..Self::default()
        }
    }

    /// Current `Cookie` header value, `None` while the jar is empty.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let jar = self.cookies.lock();
        (!jar.is_empty()).then(|| jar.serialize())
    }

    pub fn ingest_cookies(&self, headers: &HeaderMap) {
        self.cookies.lock().ingest(headers);
    }

    /// Captured CSRF token.
    #[must_use]
    pub fn csrf_token(&self) -> Option<HeaderValue> {
        self.csrf_token.lock().clone()
    }

    /// Store a token issued by the backend; `Fetch` echoes are ignored.
    pub fn capture_csrf_token(&self, headers: &HeaderMap) -> bool {
        let Some(token) = headers.get(CSRF_HEADER) else {
            return false;
        };
        if token.is_empty() || token.as_bytes().eq_ignore_ascii_case(b"fetch") {
            return false;
        }
        let mut token = token.clone();
        token.set_sensitive(true);
        *self.csrf_token.lock() = Some(token);
        tracing::debug!("captured CSRF token");
        true
    }

    #[must_use]
    pub fn saml_disabled(&self) -> bool {
        self.saml_disabled.load(Ordering::Acquire)
    }

    pub(crate) fn disable_saml(&self) {
        self.saml_disabled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.lock().is_some()
    }

    pub(crate) fn credentials(&self) -> Option<(String, SecretString)> {
        self.credentials
            .lock()
            .as_ref()
            .map(|c| (c.username.clone(), c.password.clone()))
    }

    pub(crate) fn release_credentials(&self) {
        self.credentials.lock().take();
    }
}

/// Authentication interceptor attached between basic auth and CSRF.
#[derive(Clone, Default)]
pub enum AuthInterceptor {
    #[default]
    None,
    Bearer(Arc<dyn TokenSource>),
    Ticket(SecretString),
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthInterceptor::None => f.write_str("None"),
            AuthInterceptor::Bearer(_) => f.write_str("Bearer"),
            AuthInterceptor::Ticket(_) => f.write_str("Ticket"),
        }
    }
}

/// HTTP client and state of one backend session.
pub struct Connection {
    client: HttpClient,
    base_url: Url,
    params: Vec<(String, String)>,
    state: Arc<ConnectionState>,
    s4_cloud: OnceCell<bool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url.as_str())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Build the client and interceptor chain for `config`.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::InvalidArgument` for an unusable base URL and
    /// `AbapError::Http` if the HTTP client cannot be built.
    pub fn open(config: &ProviderConfig, auth: AuthInterceptor) -> Result<Self, AbapError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AbapError::InvalidArgument(format!("invalid base url '{}': {e}", config.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || !base_url.has_host() {
            return Err(AbapError::InvalidArgument(format!(
                "base url must be an http(s) origin: {}",
                config.base_url
            )));
        }

        let http_config = HttpClientConfig {
            request_timeout: config.timeout,
            accept_invalid_certs: config.ignore_cert_errors,
            user_agent: config
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            default_headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ..HttpClientConfig::default()
        };
        let max_body_size = http_config.max_body_size;

        let state = Arc::new(ConnectionState::new(config.auth.clone()));
        let mut builder = HttpClientBuilder::with_config(http_config);
        if base_url.scheme() == "http" {
            builder = builder.allow_insecure_http();
        }
        if state.has_credentials() {
            builder = builder.layer(BasicAuthLayer::new(Arc::clone(&state)));
        }
        builder = match auth {
            AuthInterceptor::None => builder,
            AuthInterceptor::Bearer(source) => builder.layer(BearerAuthLayer::new(source)),
            AuthInterceptor::Ticket(ticket) => builder.layer(TicketAuthLayer::new(ticket)),
        };
        let client = builder
            .layer(CsrfLayer::new(Arc::clone(&state)))
            .layer(ValidationLayer::new(Arc::clone(&state), max_body_size))
            .layer(CookieLayer::new(Arc::clone(&state)))
            .build()?;

        let params = config
            .client
            .iter()
            .map(|c| ("sap-client".to_owned(), c.clone()))
            .collect();

        tracing::debug!(base_url = %base_url, "opened backend connection");
        Ok(Self {
            client,
            base_url,
            params,
            state,
            s4_cloud: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Absolute URL for `path` with the connection's default parameters
    /// (e.g. `sap-client`) followed by `params`.
    #[must_use]
    pub fn url(&self, path: &str, params: &[(String, String)]) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{base_path}{path}"));

        let query = self
            .params
            .iter()
            .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
            .chain(params)
            .map(|(k, v)| format!("{}={}", encode_query(k), encode_query(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        url
    }

    /// Whether the backend is an S/4HANA Cloud tenant.
    ///
    /// Probed once per connection; probe failures count as `false`.
    pub async fn is_s4_cloud(&self) -> bool {
        *self
            .s4_cloud
            .get_or_init(|| async {
                match crate::ato::fetch_settings(self).await {
                    Ok(settings) => settings.is_s4_cloud(),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "failed to detect whether this is an S/4HANA Cloud system"
                        );
                        false
                    }
                }
            })
            .await
    }
}

/// Percent-encode a query component, keeping the characters OData
/// expressions use literally.
fn encode_query(raw: &str) -> String {
    urlencoding::encode(raw)
        .replace("%24", "$")
        .replace("%2C", ",")
        .replace("%3A", ":")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%20", "+")
}

/// Copy a request so it can be sent again.
pub(crate) fn clone_request(req: &HttpRequest) -> HttpRequest {
    let mut copy = Request::new(req.body().clone());
    *copy.method_mut() = req.method().clone();
    *copy.uri_mut() = req.uri().clone();
    *copy.version_mut() = req.version();
    *copy.headers_mut() = req.headers().clone();
    copy
}
