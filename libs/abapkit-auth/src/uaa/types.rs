use std::time::Duration;

use serde::Deserialize;

use abapkit_utils::SecretString;

/// Successful token endpoint response.
///
/// `Deserialize`-only so tokens cannot be serialized into logs by accident.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// OAuth2 error body (`{"error": "...", "error_description": "..."}`).
#[derive(Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// Errors that mean the refresh token can no longer be used.
    #[must_use]
    pub fn rejects_refresh_token(&self) -> bool {
        matches!(self.error.as_str(), "invalid_token" | "invalid_grant")
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{}: {desc}", self.error),
            None => self.error.clone(),
        }
    }
}

/// Tokens obtained from the UAA.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<Duration>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(resp: TokenResponse) -> Self {
        Self {
            access_token: SecretString::new(resp.access_token),
            refresh_token: resp.refresh_token.map(SecretString::new),
            expires_in: resp.expires_in.map(Duration::from_secs),
        }
    }
}
