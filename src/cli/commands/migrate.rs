//! Migrate command implementation.
//!
//! Opening the database already applies pending migrations; this command
//! reports the result.

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::storage::{Database, Executor};
use crate::storage::migrations::known_versions;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct MigrateOutput {
    dialect: String,
    location: String,
    applied: Vec<String>,
    pending: Vec<String>,
}

/// Known versions missing from `applied`, in migration order.
fn pending_versions(applied: &[String]) -> Vec<String> {
    known_versions()
        .into_iter()
        .filter(|v| !applied.iter().any(|a| a.as_str() == *v))
        .map(str::to_string)
        .collect()
}

/// # Errors
///
/// Returns an error if the applied versions cannot be read.
pub fn execute(db: &Database, config: &DatabaseConfig, json: bool) -> Result<()> {
    let applied = db.schema_version()?;
    let pending = pending_versions(&applied);

    if json {
        return super::print_json(&MigrateOutput {
            dialect: db.dialect().to_string(),
            location: config.describe(),
            applied,
            pending,
        });
    }

    println!("{} {}", "Database:".bold(), config.describe());
    println!("{} {}", "Dialect: ".bold(), db.dialect());
    for version in &applied {
        println!("  {} {version}", "✓".green());
    }
    for version in &pending {
        println!("  {} {version}", "✗".red());
    }
    if pending.is_empty() {
        println!("Schema up to date ({} migrations).", applied.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_versions() {
        let all: Vec<String> = known_versions().into_iter().map(str::to_string).collect();
        assert_eq!(pending_versions(&[]), all);
        assert!(pending_versions(&all).is_empty());

        let db = Database::open_in_memory().unwrap();
        assert!(pending_versions(&db.schema_version().unwrap()).is_empty());
        assert_eq!(pending_versions(&all[..1]), all[1..]);
    }
}
