#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Small shared helpers for the abapkit crates.

pub mod duration_serde;
mod secret_string;

pub use secret_string::SecretString;
