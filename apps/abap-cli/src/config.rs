use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use abapkit::{AbapServiceProvider, BtpOptions, ProviderConfig, ReentranceOptions};
use abapkit_auth::ServiceKey;
use abapkit_utils::SecretString;

/// Prefix of environment overrides, e.g. `ABAPKIT__URL`.
const ENV_PREFIX: &str = "ABAPKIT__";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// User and password, or no authentication at all.
    #[default]
    Basic,
    /// ABAP environment on BTP, logged in through its service key.
    Btp,
    /// Browser login that hands back a reentrance ticket.
    Reentrance,
    /// Destination of the development environment's proxy.
    Destination,
}

/// Connection settings after all layers are merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub url: Option<String>,
    pub client: Option<String>,
    pub auth: AuthMode,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<SecretString>,
    pub service_key: Option<PathBuf>,
    /// Refresh token of the last BTP login, reused and rotated in place.
    pub refresh_token_file: Option<PathBuf>,
    pub destination: Option<String>,
    pub ignore_cert_errors: bool,
    #[serde(with = "abapkit_utils::duration_serde")]
    pub timeout: Duration,
    #[serde(with = "abapkit_utils::duration_serde")]
    pub login_timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            url: None,
            client: None,
            auth: AuthMode::Basic,
            username: None,
            password: None,
            service_key: None,
            refresh_token_file: None,
            destination: None,
            ignore_cert_errors: false,
            timeout: DEFAULT_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }
}

/// Connection flags shared by all commands; they win over file and env.
#[derive(Args, Debug, Default, Clone, Serialize)]
pub struct SystemArgs {
    /// Backend URL, e.g. `https://s4.example.com:44300`
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// SAP client (`sap-client` parameter)
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    #[arg(long, value_enum, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMode>,

    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// BTP service key file
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<PathBuf>,

    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Accept any TLS certificate
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore_cert_errors: bool,
}

impl CliConfig {
    /// Merge defaults, the YAML file, `ABAPKIT__*` variables and `flags`,
    /// later layers winning.
    ///
    /// # Errors
    ///
    /// Fails if `file` does not exist or a layer holds values of the wrong type.
    pub fn load(file: Option<&Path>, flags: &SystemArgs) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(CliConfig::default()));
        if let Some(path) = file {
            if !path.is_file() {
                bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(flags))
            .extract()
            .context("invalid configuration")
    }

    fn provider_config(&self, url: &str) -> ProviderConfig {
        let mut config = ProviderConfig::new(url)
            .with_timeout(self.timeout)
            .ignore_cert_errors(self.ignore_cert_errors);
        if let Some(client) = self.client.as_deref().filter(|c| !c.is_empty()) {
            config = config.with_client(client);
        }
        if let (Some(user), Some(password)) = (&self.username, &self.password) {
            config = config.with_basic_auth(user.clone(), password.clone());
        }
        config
    }

    fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("no backend URL; pass --url or set ABAPKIT__URL")
    }

    /// Open a provider for the configured system and login method.
    ///
    /// # Errors
    ///
    /// Fails for incomplete settings, unreadable key files and failed logins.
    pub async fn connect(&self) -> Result<AbapServiceProvider> {
        tracing::debug!(auth = ?self.auth, url = ?self.url, "connecting");
        let provider = match self.auth {
            AuthMode::Basic => {
                AbapServiceProvider::create_for_abap(&self.provider_config(self.require_url()?))?
            }
            AuthMode::Destination => {
                let destination = self
                    .destination
                    .as_deref()
                    .context("--destination is required for destination auth")?;
                AbapServiceProvider::create_for_destination(
                    destination,
                    &self.provider_config(""),
                )?
            }
            AuthMode::Reentrance => {
                let options = ReentranceOptions {
                    timeout: Some(self.login_timeout),
                    browser: None,
                };
                AbapServiceProvider::create_with_reentrance_ticket(
                    &self.provider_config(self.require_url()?),
                    options,
                )
                .await?
            }
            AuthMode::Btp => {
                let key_file = self
                    .service_key
                    .as_deref()
                    .context("--service-key is required for BTP auth")?;
                let key = std::fs::read_to_string(key_file)
                    .with_context(|| format!("cannot read service key {}", key_file.display()))?;
                let key = ServiceKey::from_json(&key)?;
                let url = key.url.clone();
                AbapServiceProvider::create_for_abap_on_btp(
                    &self.provider_config(&url),
                    self.btp_options(key)?,
                )?
            }
        };
        Ok(provider)
    }

    fn btp_options(&self, key: ServiceKey) -> Result<BtpOptions> {
        let mut options = BtpOptions::new(key);
        let Some(file) = self.refresh_token_file.clone() else {
            return Ok(options);
        };

        if file.is_file() {
            let stored = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read refresh token {}", file.display()))?;
            let stored = stored.trim();
            if !stored.is_empty() {
                options.refresh_token = Some(SecretString::new(stored));
            }
        }
        options.on_refresh_token = Some(Arc::new(move |token: &SecretString| {
            if let Err(e) = std::fs::write(&file, token.expose()) {
                tracing::warn!(error = %e, path = %file.display(), "failed to store refresh token");
            }
        }));
        Ok(options)
    }
}
