//! Human readable `Duration` fields for config structs (`"30s"`, `"5m 10s"`).
//!
//! ```
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Timeouts {
//!     #[serde(with = "abapkit_utils::duration_serde")]
//!     request: Duration,
//!     #[serde(default, with = "abapkit_utils::duration_serde::option")]
//!     login: Option<Duration>,
//! }
//! ```

use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

/// Parse a humantime string into a `Duration`.
///
/// # Errors
///
/// Fails when the value is not a string or cannot be parsed by `humantime`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw)
        .map_err(|e| D::Error::custom(format!("invalid duration '{raw}': {e}")))
}

/// Format a `Duration` as a humantime string.
///
/// # Errors
///
/// Propagates serializer errors.
#[allow(clippy::trivially_copy_pass_by_ref)]
pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

/// Same as the parent module for `Option<Duration>`; `null` and a missing
/// field (with `#[serde(default)]`) both map to `None`.
pub mod option {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    ///
    /// Fails when a present value cannot be parsed by `humantime`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                humantime::parse_duration(&raw)
                    .map_err(|e| D::Error::custom(format!("invalid duration '{raw}': {e}")))
            })
            .transpose()
    }

    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }
}
