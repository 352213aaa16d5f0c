//! Backend messages returned by the deployment services.
//!
//! The UI5 repository reports in a `sap-message` header, the layered
//! repository in the response body, and failed requests carry an OData
//! error envelope. Every message is logged at its own severity; a payload
//! that cannot be parsed is logged as one line.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Success,
    Other,
}

impl Severity {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "error" | "e" | "abort" | "a" => Severity::Error,
            "warning" | "w" => Severity::Warning,
            "info" | "i" => Severity::Info,
            "success" | "s" => Severity::Success,
            _ => Severity::Other,
        }
    }
}

fn emit(severity: Severity, text: &str) {
    match severity {
        Severity::Error => tracing::error!("{text}"),
        Severity::Warning => tracing::warn!("{text}"),
        Severity::Info | Severity::Success => tracing::info!("{text}"),
        Severity::Other => tracing::debug!("{text}"),
    }
}

/// Message of the UI5 repository and of OData error details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SapMessage {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub details: Vec<SapMessage>,
    #[serde(default)]
    pub longtext_url: Option<String>,
}

impl SapMessage {
    /// Log the message and its details.
    pub fn log(&self) {
        emit(Severity::parse(&self.severity), &self.message);
        for detail in &self.details {
            let text = if detail.code.is_empty() {
                detail.message.clone()
            } else {
                format!("({}) {}", detail.code, detail.message)
            };
            emit(Severity::parse(&detail.severity), &text);
        }
        if let Some(url) = &self.longtext_url {
            tracing::debug!(longtext_url = %url, "message has a long text");
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LrepMessage {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Result and messages of a layered repository request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LrepMessages {
    #[serde(default)]
    pub result: Option<LrepMessage>,
    #[serde(default)]
    pub messages: Vec<LrepMessage>,
}

impl LrepMessages {
    pub fn log(&self) {
        if let Some(result) = &self.result {
            emit(Severity::parse(&result.severity), &result.text);
        }
        for message in &self.messages {
            emit(Severity::parse(&message.severity), &message.text);
            for detail in &message.details {
                emit(Severity::parse(&message.severity), detail);
            }
        }
    }
}

/// Log the `sap-message` header of a repository response.
pub fn log_sap_message(header: &str) {
    match serde_json::from_str::<SapMessage>(header) {
        Ok(message) => message.log(),
        Err(_) => tracing::info!("{header}"),
    }
}

/// Log a layered repository response body; `fallback` is used when it
/// carries no messages.
pub fn log_lrep_response(body: &str, fallback: &str) {
    match serde_json::from_str::<LrepMessages>(body) {
        Ok(messages) if messages.result.is_some() || !messages.messages.is_empty() => {
            messages.log();
        }
        _ => tracing::info!("{fallback}"),
    }
}

/// Messages of an OData error body: the top-level message followed by the
/// `innererror.errordetails`. `None` if `body` is not an error envelope.
#[must_use]
pub fn parse_error_envelope(body: &str) -> Option<SapMessage> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error.get("message") {
        Some(Value::String(m)) => m.clone(),
        Some(m) => m.get("value").and_then(Value::as_str)?.to_owned(),
        None => return None,
    };
    let details = error
        .get("innererror")
        .and_then(|inner| inner.get("errordetails"))
        .and_then(|details| serde_json::from_value::<Vec<SapMessage>>(details.clone()).ok())
        .unwrap_or_default();
    Some(SapMessage {
        code: error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        message,
        severity: "error".to_owned(),
        details,
        longtext_url: None,
    })
}

/// Log an error response body, or `fallback` if it is not an error envelope.
pub fn log_error(body: &str, fallback: &str) {
    match parse_error_envelope(body) {
        Some(message) => message.log(),
        None => tracing::error!("{fallback}"),
    }
}
