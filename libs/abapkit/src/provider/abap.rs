use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use abapkit_auth::{
    BrowserLauncher, ReentranceTicket, RefreshTokenCallback, ServiceKey, Uaa, UaaTokenSource,
};
use abapkit_http::{HttpClientConfig, TransportSecurity};
use abapkit_utils::SecretString;

use super::ServiceProvider;
use crate::app_index::AppIndexService;
use crate::ato::{self, AtoSettings};
use crate::catalog::{CatalogService, V2CatalogService, V4CatalogService};
use crate::config::ProviderConfig;
use crate::connection::AuthInterceptor;
use crate::deploy::{LayeredRepositoryService, Ui5AbapRepositoryService};
use crate::error::AbapError;
use crate::odata::ODataVersion;

/// Login options for an ABAP environment on BTP.
#[derive(Clone)]
pub struct BtpOptions {
    pub service_key: ServiceKey,
    /// Refresh token from an earlier session, tried before a browser login.
    pub refresh_token: Option<SecretString>,
    pub on_refresh_token: Option<RefreshTokenCallback>,
    pub browser: Option<Arc<dyn BrowserLauncher>>,
}

impl BtpOptions {
    #[must_use]
    pub fn new(service_key: ServiceKey) -> Self {
        Self {
            service_key,
            refresh_token: None,
            on_refresh_token: None,
            browser: None,
        }
    }
}

impl std::fmt::Debug for BtpOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtpOptions")
            .field("url", &self.service_key.url)
            .field("refresh_token", &self.refresh_token)
            .finish_non_exhaustive()
    }
}

/// Options of the reentrance ticket login.
#[derive(Clone, Default)]
pub struct ReentranceOptions {
    pub timeout: Option<Duration>,
    pub browser: Option<Arc<dyn BrowserLauncher>>,
}

impl std::fmt::Debug for ReentranceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReentranceOptions")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// [`ServiceProvider`] with accessors for the well-known ABAP services.
#[derive(Debug)]
pub struct AbapServiceProvider {
    inner: ServiceProvider,
}

impl Deref for AbapServiceProvider {
    type Target = ServiceProvider;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AbapServiceProvider {
    /// Provider for an on-premise system, with basic auth if `config`
    /// carries credentials.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::InvalidArgument` for an unusable base URL and
    /// `AbapError::Http` if the HTTP client cannot be built.
    pub fn create_for_abap(config: &ProviderConfig) -> Result<Self, AbapError> {
        Ok(Self {
            inner: ServiceProvider::create(config)?,
        })
    }

    /// Provider for an ABAP environment on BTP.
    ///
    /// The base URL comes from the service key. Requests carry a UAA bearer
    /// token, obtained on the first request.
    ///
    /// # Errors
    ///
    /// Same as [`create_for_abap`](Self::create_for_abap), plus
    /// `AbapError::Auth` if the UAA client cannot be built.
    pub fn create_for_abap_on_btp(
        config: &ProviderConfig,
        options: BtpOptions,
    ) -> Result<Self, AbapError> {
        let mut config = config.clone();
        config.base_url.clone_from(&options.service_key.url);
        config.auth = None;

        let transport = if options.service_key.uaa.url.starts_with("http://") {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        };
        let http_config = HttpClientConfig {
            accept_invalid_certs: config.ignore_cert_errors,
            transport,
            ..HttpClientConfig::token_endpoint()
        };
        let mut uaa = Uaa::with_http_config(options.service_key.uaa, http_config)?;
        if let Some(browser) = options.browser {
            uaa = uaa.browser(browser);
        }
        if let Some(callback) = options.on_refresh_token {
            uaa = uaa.on_refresh_token(callback);
        }
        let source = UaaTokenSource::new(uaa, options.refresh_token);

        tracing::debug!(base_url = %config.base_url, "creating provider for ABAP environment on BTP");
        Ok(Self {
            inner: ServiceProvider::with_auth(&config, AuthInterceptor::Bearer(Arc::new(source)))?,
        })
    }

    /// Provider for a system reached through a destination of the
    /// development environment's proxy.
    ///
    /// # Errors
    ///
    /// Same as [`create_for_abap`](Self::create_for_abap).
    pub fn create_for_destination(
        destination: &str,
        config: &ProviderConfig,
    ) -> Result<Self, AbapError> {
        if destination.is_empty() {
            return Err(AbapError::InvalidArgument(
                "destination name must not be empty".to_owned(),
            ));
        }
        let mut config = config.clone();
        config.base_url = format!("https://{destination}.dest");
        Self::create_for_abap(&config)
    }

    /// Provider authenticated with a reentrance ticket obtained through
    /// the browser.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::Auth` if the ticket flow fails or times out,
    /// otherwise the same as [`create_for_abap`](Self::create_for_abap).
    pub async fn create_with_reentrance_ticket(
        config: &ProviderConfig,
        options: ReentranceOptions,
    ) -> Result<Self, AbapError> {
        let mut flow = ReentranceTicket::new();
        if let Some(timeout) = options.timeout {
            flow = flow.timeout(timeout);
        }
        if let Some(browser) = options.browser {
            flow = flow.browser(browser);
        }
        let ticket = flow.get(&config.base_url).await?;

        let mut config = config.clone();
        config.auth = None;
        Ok(Self {
            inner: ServiceProvider::with_auth(&config, AuthInterceptor::Ticket(ticket))?,
        })
    }

    /// Service catalog of the given protocol version.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::ServiceTypeMismatch` if the catalog path was
    /// claimed by another service type.
    pub fn catalog(&self, version: ODataVersion) -> Result<Arc<dyn CatalogService>, AbapError> {
        Ok(match version {
            ODataVersion::V2 => {
                self.create_service::<V2CatalogService>(V2CatalogService::PATH)?
                    as Arc<dyn CatalogService>
            }
            ODataVersion::V4 => {
                self.create_service::<V4CatalogService>(V4CatalogService::PATH)?
                    as Arc<dyn CatalogService>
            }
        })
    }

    /// Repository service for UI5 application deployment.
    ///
    /// # Errors
    ///
    /// Same as [`catalog`](Self::catalog).
    pub fn ui5_abap_repository(&self) -> Result<Arc<Ui5AbapRepositoryService>, AbapError> {
        self.create_service(Ui5AbapRepositoryService::PATH)
    }

    /// Layered repository for adaptation project deployment.
    ///
    /// # Errors
    ///
    /// Same as [`catalog`](Self::catalog).
    pub fn layered_repository(&self) -> Result<Arc<LayeredRepositoryService>, AbapError> {
        self.create_service(LayeredRepositoryService::PATH)
    }

    /// Index of the applications deployed to the system.
    ///
    /// # Errors
    ///
    /// Same as [`catalog`](Self::catalog).
    pub fn app_index(&self) -> Result<Arc<AppIndexService>, AbapError> {
        self.create_service(AppIndexService::PATH)
    }

    /// Whether the system is an S/4HANA Cloud tenant; probed once.
    pub async fn is_s4_cloud(&self) -> bool {
        self.connection().is_s4_cloud().await
    }

    /// ATO settings of the system.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::Http` if the request fails and `AbapError::Xml`
    /// for an unreadable document.
    pub async fn ato_settings(&self) -> Result<AtoSettings, AbapError> {
        ato::fetch_settings(self.connection()).await
    }
}
