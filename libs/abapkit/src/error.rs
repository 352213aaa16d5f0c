use http::StatusCode;
use thiserror::Error;

use abapkit_auth::AuthError;
use abapkit_http::HttpError;

/// The first response of a session was rejected, or turned out to be a
/// login page.
#[derive(Debug, Clone, Error)]
#[error("connection failed with HTTP {status}: {message}")]
pub struct ConnectionError {
    pub status: StatusCode,
    pub message: String,
    /// Start of the response body, if one was read.
    pub body_preview: Option<String>,
}

impl ConnectionError {
    pub(crate) fn login_required(reason: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: format!("login required ({reason})"),
            body_preview: None,
        }
    }
}

/// A 2xx OData response whose payload carries an `error` object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}{}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct ODataRequestError {
    pub code: Option<String>,
    pub message: String,
}

/// Errors returned by services of a [`ServiceProvider`](crate::ServiceProvider).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AbapError {
    /// Transport, TLS, timeout or status error from the HTTP layer.
    #[error(transparent)]
    Http(HttpError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    OData(#[from] ODataRequestError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid XML: {0}")]
    Xml(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service at '{path}' is already registered as {registered}")]
    ServiceTypeMismatch {
        path: String,
        registered: &'static str,
    },
}

impl AbapError {
    /// HTTP status behind the error, whether the backend answered with it
    /// directly or the connection check rejected it.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AbapError::Http(e) => e.status(),
            AbapError::Connection(e) => Some(e.status),
            _ => None,
        }
    }

    /// `true` if the backend answered 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Response body preview for status errors.
    #[must_use]
    pub fn body_preview(&self) -> Option<&str> {
        match self {
            AbapError::Http(HttpError::HttpStatus { body_preview, .. }) => Some(body_preview),
            AbapError::Connection(e) => e.body_preview.as_deref(),
            _ => None,
        }
    }
}

impl From<HttpError> for AbapError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Intercepted(inner) => {
                let inner = match inner.downcast::<ConnectionError>() {
                    Ok(e) => return AbapError::Connection(*e),
                    Err(other) => other,
                };
                match inner.downcast::<AuthError>() {
                    Ok(e) => AbapError::Auth(*e),
                    Err(other) => AbapError::Http(HttpError::Intercepted(other)),
                }
            }
            other => AbapError::Http(other),
        }
    }
}

impl From<quick_xml::Error> for AbapError {
    fn from(err: quick_xml::Error) -> Self {
        AbapError::Xml(err.to_string())
    }
}
