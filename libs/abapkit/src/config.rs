use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use abapkit_utils::SecretString;

/// Default per-request timeout; deployments of large archives take minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// User name and password for basic authentication.
///
/// The password is dropped from the session after the first successful
/// response; the session cookie authenticates from then on.
#[derive(Clone, Debug, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

/// Connection settings of a [`ServiceProvider`](crate::ServiceProvider).
///
/// Providers clone the config they are created from, so a caller can reuse
/// one value for several providers.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Origin of the backend, e.g. `https://s4.example.com:44300`.
    pub base_url: String,
    /// Value for the `sap-client` query parameter.
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
    #[serde(default)]
    pub ignore_cert_errors: bool,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout", with = "abapkit_utils::duration_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl ProviderConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: None,
            auth: None,
            ignore_cert_errors: false,
            headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    #[must_use]
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn ignore_cert_errors(mut self, ignore: bool) -> Self {
        self.ignore_cert_errors = ignore;
        self
    }
}
