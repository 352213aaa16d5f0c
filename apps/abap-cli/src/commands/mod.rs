pub mod apps;
pub mod repository;
pub mod services;
pub mod variant;

use anyhow::Result;
use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
