//! OAuth2 login against the UAA of an ABAP environment on BTP.

mod config;
mod source;
mod types;

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use http::StatusCode;
use http::header::AUTHORIZATION;
use url::Url;
use zeroize::Zeroizing;

use abapkit_http::{HttpClient, HttpClientBuilder, HttpClientConfig};
use abapkit_utils::SecretString;

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::error::{AuthError, AuthFlow};
use crate::http_error::format_http_error;
use crate::redirect::RedirectCapture;

pub use config::{ServiceKey, UaaConfig};
pub use source::UaaTokenSource;
pub use types::TokenGrant;
use types::{TokenErrorResponse, TokenResponse};

/// Local path the UAA redirects the browser to.
pub const REDIRECT_PATH: &str = "/oauth/client/redirect";

const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Invoked with every refresh token that differs from the one the caller
/// supplied, so it can be persisted outside the process.
pub type RefreshTokenCallback = Arc<dyn Fn(&SecretString) + Send + Sync>;

/// UAA client for the authorization-code and refresh-token grants.
pub struct Uaa {
    config: UaaConfig,
    client: HttpClient,
    browser: Arc<dyn BrowserLauncher>,
    login_timeout: Duration,
    token_timeout: Duration,
    on_refresh_token: Option<RefreshTokenCallback>,
}

impl std::fmt::Debug for Uaa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uaa")
            .field("url", &self.config.url)
            .field("client_id", &self.config.client_id)
            .field("login_timeout", &self.login_timeout)
            .field("token_timeout", &self.token_timeout)
            .finish_non_exhaustive()
    }
}

impl Uaa {
    /// Create a UAA client with the token endpoint HTTP preset.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Http` if the HTTP client cannot be built.
    pub fn new(config: UaaConfig) -> Result<Self, AuthError> {
        Self::with_http_config(config, HttpClientConfig::token_endpoint())
    }

    /// Create a UAA client with a custom HTTP configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Http` if the HTTP client cannot be built.
    pub fn with_http_config(
        config: UaaConfig,
        http_config: HttpClientConfig,
    ) -> Result<Self, AuthError> {
        let client = HttpClientBuilder::with_config(http_config)
            .build()
            .map_err(|e| AuthError::Http(format_http_error(&e, "UAA token")))?;

        Ok(Self {
            config,
            client,
            browser: Arc::new(SystemBrowser),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            on_refresh_token: None,
        })
    }

    #[must_use]
    pub fn browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// How long to wait for the browser redirect.
    #[must_use]
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Bound for a single token endpoint exchange.
    #[must_use]
    pub fn token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    #[must_use]
    pub fn on_refresh_token(mut self, callback: RefreshTokenCallback) -> Self {
        self.on_refresh_token = Some(callback);
        self
    }

    /// Obtain an access token.
    ///
    /// With a `refresh_token` the refresh grant is tried first. If the UAA
    /// rejects it (401, `invalid_token`, `invalid_grant`) an interactive
    /// login is started instead.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Timeout` when the login or a token exchange takes
    /// too long, and the other `AuthError` variants for rejected grants or
    /// transport failures.
    pub async fn get_access_token(
        &self,
        refresh_token: Option<&SecretString>,
    ) -> Result<TokenGrant, AuthError> {
        if let Some(current) = refresh_token {
            match self.refresh(current).await {
                Ok(grant) => {
                    self.report_refresh_token(Some(current), &grant);
                    return Ok(grant);
                }
                Err(AuthError::TokenRejected(reason)) => {
                    tracing::info!(%reason, "refresh token rejected; starting interactive login");
                }
                Err(e) => return Err(e),
            }
        }

        let grant = self.login().await?;
        self.report_refresh_token(refresh_token, &grant);
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, AuthError> {
        tracing::debug!("requesting access token with refresh token");
        let token = Zeroizing::new(refresh_token.expose().to_owned());
        self.exchange(&[("grant_type", "refresh_token"), ("refresh_token", token.as_str())])
            .await
    }

    async fn login(&self) -> Result<TokenGrant, AuthError> {
        let capture = RedirectCapture::start(AuthFlow::Uaa, REDIRECT_PATH, self.login_timeout).await?;
        let redirect_uri = capture.redirect_url().to_owned();

        let mut authorize = Url::parse(&self.config.endpoint("/oauth/authorize"))
            .map_err(|e| AuthError::Config(format!("invalid UAA url: {e}")))?;
        authorize
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &redirect_uri);

        self.browser.open(authorize.as_str()).await?;
        let params = capture.wait().await?;

        if let Some(error) = params.get("error") {
            return Err(AuthError::TokenRejected(format!("authorization failed: {error}")));
        }
        let code = params
            .get("code")
            .map(|c| Zeroizing::new(c.clone()))
            .ok_or_else(|| {
                AuthError::InvalidResponse("redirect did not carry an authorization code".into())
            })?;

        tracing::debug!("exchanging authorization code");
        self.exchange(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .await
    }

    async fn exchange(&self, fields: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        tokio::time::timeout(self.token_timeout, self.request_token(fields))
            .await
            .map_err(|_| AuthError::Timeout {
                flow: AuthFlow::Uaa,
                after: self.token_timeout,
            })?
    }

    async fn request_token(&self, fields: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let credentials = Zeroizing::new(format!(
            "{}:{}",
            self.config.client_id,
            self.config.client_secret.expose()
        ));
        let encoded = Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
        let header_value = Zeroizing::new(format!("Basic {}", &*encoded));

        let response = self
            .client
            .post(&self.config.endpoint("/oauth/token"))
            .header(AUTHORIZATION.as_str(), &header_value)
            .header("accept", "application/json")
            .form(fields)
            .map_err(|e| AuthError::Http(format_http_error(&e, "UAA token")))?
            .send()
            .await
            .map_err(|e| AuthError::Http(format_http_error(&e, "UAA token")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Http(format_http_error(&e, "UAA token")))?;

        if let Ok(error) = serde_json::from_slice::<TokenErrorResponse>(&body) {
            tracing::debug!(%status, error = %error.error, "token endpoint returned an error");
            if status == StatusCode::UNAUTHORIZED || error.rejects_refresh_token() {
                return Err(AuthError::TokenRejected(error.describe()));
            }
            return Err(AuthError::InvalidResponse(format!(
                "UAA token HTTP {status}: {}",
                error.describe()
            )));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::TokenRejected(format!("UAA token HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AuthError::Http(format!("UAA token HTTP {status}")));
        }

        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("UAA token response: {e}")))?;
        Ok(token.into())
    }

    fn report_refresh_token(&self, previous: Option<&SecretString>, grant: &TokenGrant) {
        if let (Some(callback), Some(new)) = (&self.on_refresh_token, &grant.refresh_token)
            && previous != Some(new)
        {
            tracing::debug!("reporting new refresh token");
            callback(new);
        }
    }
}
