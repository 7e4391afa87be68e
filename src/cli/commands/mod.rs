//! Command implementations.

pub mod completions;
pub mod dashboard;
pub mod event;
pub mod migrate;
pub mod phase;
pub mod task;
pub mod transcript;
pub mod version;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::storage::Database;
use serde::Serialize;
use tracing::debug;

/// Open the configured backend; pending migrations are applied on open.
///
/// # Errors
///
/// Returns a config, connection or migration error.
pub fn open_database(config: &DatabaseConfig) -> Result<Database> {
    debug!(dialect = %config.dialect, location = %config.describe(), "opening database");
    Database::open(config)
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate to `max` characters, marking the cut with `...`.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
