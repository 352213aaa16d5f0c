use crate::config::{HttpClientConfig, RedirectConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{DefaultHeadersLayer, LoginRedirectPolicy};
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

/// Type-erased service that interceptors wrap.
///
/// Requests carry a fully buffered body, so an interceptor may clone and
/// replay a request without coordinating with the caller.
pub type HttpService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

type Interceptor = Box<dyn FnOnce(HttpService) -> HttpService + Send>;

/// Builder for constructing an [`HttpClient`](crate::HttpClient) with a layered tower middleware stack.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    interceptors: Vec<Interceptor>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            interceptors: Vec::new(),
        }
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request unless the request sets it itself
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the maximum response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain HTTP connections
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    #[must_use]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Skip server certificate validation
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    /// Attach an interceptor around the transport stack.
    ///
    /// Interceptors run in attach order on the way out: the first one
    /// attached is the outermost and sees the request first and the
    /// response last.
    ///
    /// Stack position: `Buffer → **interceptors** → Timeout → …`
    #[must_use]
    pub fn interceptor(
        mut self,
        wrap: impl FnOnce(HttpService) -> HttpService + Send + 'static,
    ) -> Self {
        self.interceptors.push(Box::new(wrap));
        self
    }

    /// Attach a tower [`Layer`] as an interceptor.
    ///
    /// Same ordering rules as [`interceptor`](Self::interceptor).
    #[must_use]
    pub fn layer<L>(self, layer: L) -> Self
    where
        L: Layer<HttpService> + Send + 'static,
        L::Service: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request<Full<Bytes>>>>::Future: Send + 'static,
    {
        self.interceptor(move |inner| BoxCloneService::new(layer.layer(inner)))
    }

    /// Set the buffer capacity for concurrent request handling
    ///
    /// A capacity of 0 is clamped to 1 (tower's Buffer panics on 0).
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Disable redirect following
    #[must_use]
    pub fn no_redirects(mut self) -> Self {
        self.config.redirect = RedirectConfig::disabled();
        self
    }

    /// Set the redirect policy configuration
    #[must_use]
    pub fn redirect(mut self, config: RedirectConfig) -> Self {
        self.config.redirect = config;
        self
    }

    /// Set the idle connection timeout for the connection pool
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the HTTP client with all configured layers
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails or a default header is invalid
    pub fn build(self) -> Result<crate::HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::debug!("plain HTTP connections enabled");
        }
        if self.config.accept_invalid_certs {
            tracing::warn!("server certificate validation disabled");
        }

        let timeout = self.config.request_timeout;

        let https = build_https_connector(
            self.config.tls_roots,
            self.config.transport,
            self.config.accept_invalid_certs,
        )?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let headers_layer = DefaultHeadersLayer::try_new(
            &self.config.user_agent,
            self.config
                .default_headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        )?;

        // Request flow (outer → inner):
        //   Buffer → interceptors (attach order) → ErrorMapping → Timeout →
        //   DefaultHeaders → Decompression → FollowRedirect → hyper_client
        //
        // send() returns Ok for every HTTP status; interceptors decide which
        // statuses become errors.
        let redirect_policy = LoginRedirectPolicy::new(self.config.redirect.clone());

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(headers_layer)
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(redirect_policy))
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let mut service: HttpService = service.boxed_clone();
        for wrap in self.interceptors.into_iter().rev() {
            service = wrap(service);
        }

        let buffered_service: crate::client::BufferedService =
            Buffer::new(service, self.config.buffer_capacity.max(1));

        Ok(crate::HttpClient {
            service: buffered_service,
            max_body_size: self.config.max_body_size,
            transport_security: self.config.transport,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tower errors to `HttpError` with actual timeout duration
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Convert `Response<DecompressionBody<Incoming>>` into `Response<ResponseBody>`.
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Build the HTTPS connector for the given trust configuration.
///
/// ALPN advertises both h2 and http/1.1.
///
/// # Errors
///
/// Returns `HttpError::Tls` when native roots are requested but unavailable,
/// or when the TLS config cannot be built.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
    accept_invalid_certs: bool,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    let builder = if accept_invalid_certs {
        let client_config =
            tls::accept_any_cert_client_config().map_err(|e| HttpError::Tls(Box::new(e)))?;
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
    } else {
        match tls_roots {
            TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::get_crypto_provider())
                .map_err(|e| HttpError::Tls(Box::new(e)))?,
            TlsRootConfig::Native => {
                let client_config =
                    tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
            }
        }
    };

    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
