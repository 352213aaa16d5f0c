use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::normalize;
use crate::error::{AbapError, ODataRequestError};

/// Successful response of an OData service, fully read.
#[derive(Debug, Clone)]
pub struct ODataResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ODataResponse {
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text, lossy UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::Json` for malformed bodies.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AbapError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Payload with the OData envelope removed, see [`normalize`].
    ///
    /// An empty body yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::OData` when the body carries an `error` object
    /// and `AbapError::Json` for malformed bodies.
    pub fn odata(&self) -> Result<Value, AbapError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        let body: Value = self.json()?;
        if let Some(error) = body.get("error") {
            return Err(request_error(error).into());
        }
        Ok(normalize(body))
    }

    /// [`odata`](Self::odata) deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`odata`](Self::odata), plus `AbapError::Json` when the
    /// payload does not fit `T`.
    pub fn odata_as<T: DeserializeOwned>(&self) -> Result<T, AbapError> {
        Ok(serde_json::from_value(self.odata()?)?)
    }
}

fn request_error(error: &Value) -> ODataRequestError {
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_owned);
    let message = match error.get("message") {
        Some(Value::String(m)) => m.clone(),
        Some(m) => m
            .get("value")
            .and_then(Value::as_str)
            .map_or_else(|| m.to_string(), str::to_owned),
        None => error.to_string(),
    };
    ODataRequestError { code, message }
}
