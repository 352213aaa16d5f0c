use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Interactive flow that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthFlow {
    /// OAuth2 login / token exchange against the UAA
    Uaa,
    /// SAML reentrance ticket
    ReentranceTicket,
}

impl fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFlow::Uaa => f.write_str("UAA"),
            AuthFlow::ReentranceTicket => f.write_str("reentrance ticket"),
        }
    }
}

/// Errors returned by the login flows and auth interceptors.
///
/// Secret values (client secret, tokens, tickets) never appear in the
/// formatted output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// A bounded wait (browser redirect, token exchange) expired.
    #[error("{flow} timed out after {after:?}")]
    Timeout { flow: AuthFlow, after: Duration },

    /// HTTP transport or status error, already formatted by
    /// [`format_http_error`](crate::http_error::format_http_error).
    #[error("{0}")]
    Http(String),

    /// The token endpoint refused a grant.
    #[error("token rejected: {0}")]
    TokenRejected(String),

    /// The backend answered with something that cannot be used.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The system browser could not be opened.
    #[error("failed to open browser: {0}")]
    Browser(String),

    /// The local redirect server could not be started.
    #[error("redirect server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (service key, URLs).
    #[error("auth config error: {0}")]
    Config(String),
}

impl AuthError {
    /// `true` for expired waits.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, AuthError::Timeout { .. })
    }
}
