use serde::Deserialize;

use abapkit_utils::SecretString;

/// UAA section of a BTP service key.
///
/// Field names follow the service key JSON (`clientid`, `clientsecret`).
#[derive(Clone, Debug, Deserialize)]
pub struct UaaConfig {
    #[serde(rename = "clientid")]
    pub client_id: String,
    #[serde(rename = "clientsecret")]
    pub client_secret: SecretString,
    /// Base URL of the UAA, e.g. `https://tenant.authentication.eu10.hana.ondemand.com`.
    pub url: String,
}

impl UaaConfig {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url.trim_end_matches('/'))
    }
}

/// Service key of an ABAP environment instance on BTP.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceKey {
    pub uaa: UaaConfig,
    /// ABAP system URL.
    pub url: String,
    #[serde(default, rename = "systemid")]
    pub system_id: Option<String>,
}

impl ServiceKey {
    /// Parse a service key from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the JSON does not describe a service key.
    pub fn from_json(json: &str) -> Result<Self, crate::AuthError> {
        serde_json::from_str(json)
            .map_err(|e| crate::AuthError::Config(format!("invalid service key: {e}")))
    }
}
