//! Version command implementation.

use crate::error::Result;
use crate::storage::migrations::known_versions;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    schema: &'a str,
}

/// Print the crate version and the newest schema migration it ships.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) { "dev" } else { "release" };
    let schema = known_versions().last().copied().unwrap_or("none");

    if json {
        let output = VersionOutput { version, build, schema };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("flowstore version {version} ({build}, schema {schema})");
    Ok(())
}
