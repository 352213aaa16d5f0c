//! OData services mounted on a [`Connection`](crate::connection::Connection).
//!
//! GET requests ask for JSON unless the caller wants another format, and
//! [`ODataResponse::odata`] unwraps the v2 (`d` / `d.results`) and v4
//! (`value`) envelopes without further I/O.

mod response;
mod service;

use serde::Serialize;
use serde_json::Value;

pub use response::ODataResponse;
pub use service::ODataService;
pub(crate) use service::mount_path;

/// OData protocol version of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ODataVersion {
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "4")]
    V4,
}

impl std::fmt::Display for ODataVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ODataVersion::V2 => f.write_str("v2"),
            ODataVersion::V4 => f.write_str("v4"),
        }
    }
}

/// Entity sets listed in a service root document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDocument {
    pub entity_sets: Vec<String>,
}

impl ServiceDocument {
    /// Read either `{"EntitySets": [...]}` (v2) or `[{"name": ..., "url": ...}]` (v4).
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let entity_sets = match value {
            Value::Object(map) => map
                .get("EntitySets")
                .and_then(Value::as_array)
                .map(|sets| {
                    sets.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            Value::Array(sets) => sets
                .iter()
                .filter_map(|set| set.get("name").and_then(Value::as_str))
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        };
        Self { entity_sets }
    }

    #[must_use]
    pub fn contains(&self, entity_set: &str) -> bool {
        self.entity_sets.iter().any(|s| s == entity_set)
    }
}

/// Query parameters and headers of a single service request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) params: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    raw: bool,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send the request as given, without asking for JSON.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `false` when the caller asked for a format other than JSON.
    #[must_use]
    pub fn wants_json(&self) -> bool {
        !self.raw
            && self
                .param_value("$format")
                .is_none_or(|f| f.eq_ignore_ascii_case("json"))
            && self
                .header_value("accept")
                .is_none_or(|a| a.to_ascii_lowercase().contains("json"))
    }

    /// Add `$format=json` and `Accept: application/json` where missing.
    pub(crate) fn force_json(mut self) -> Self {
        if self.param_value("$format").is_none() {
            self.params.push(("$format".to_owned(), "json".to_owned()));
        }
        if self.header_value("accept").is_none() {
            self.headers
                .push(("accept".to_owned(), "application/json".to_owned()));
        }
        self
    }
}

/// Unwrap an OData payload.
///
/// v2 bodies (`{"d": ...}`) yield `d.results` if present, else `d`. v4
/// bodies (`@odata.context`) yield `value` if present, else the body.
/// Anything else is returned unchanged.
#[must_use]
pub fn normalize(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            if let Some(mut d) = map.remove("d") {
                return match d.get_mut("results").map(Value::take) {
                    Some(results) => results,
                    None => d,
                };
            }
            if map.contains_key("@odata.context") {
                return match map.remove("value") {
                    Some(value) => value,
                    None => Value::Object(map),
                };
            }
            Value::Object(map)
        }
        other => other,
    }
}
