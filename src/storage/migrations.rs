//! Database migrations embedded at compile time.
//!
//! Each version ships one SQL file per dialect under `/migrations/<dialect>/`
//! at the repo root, embedded with `include_str!` so the binary carries its
//! own schema.

use crate::error::{Error, Result};
use crate::storage::context::Context;
use crate::storage::database::{Database, Executor};
use crate::storage::dialect::Dialect;
use std::collections::HashSet;
use tracing::{info, warn};

/// A single migration with version identifier and per-dialect SQL.
struct Migration {
    version: &'static str,
    sqlite: &'static str,
    postgres: &'static str,
}

impl Migration {
    const fn sql(&self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Sqlite => self.sqlite,
            Dialect::Postgres => self.postgres,
        }
    }
}

macro_rules! migration {
    ($version:literal) => {
        Migration {
            version: $version,
            sqlite: include_str!(concat!("../../migrations/sqlite/", $version, ".sql")),
            postgres: include_str!(concat!("../../migrations/postgres/", $version, ".sql")),
        }
    };
}

/// All migrations in order.
///
/// Version names match the SQL filenames (without .sql extension).
/// The `schema_migrations` table tracks which have been applied.
const MIGRATIONS: &[Migration] = &[
    migration!("001_core"),
    migration!("002_transcripts_fts"),
    migration!("003_event_log_dedup"),
    migration!("004_dashboard_indexes"),
    migration!("005_task_target_branch"),
];

/// Run all pending migrations on the database.
///
/// Already-applied versions are skipped, so this is safe to call on every
/// open. Each pending version runs in its own transaction together with its
/// `schema_migrations` row.
///
/// # Errors
///
/// Returns `Migration` for the first version that fails; nothing after it is
/// attempted. A SQLite `duplicate column name` failure is tolerated (the
/// column already exists) and the version is recorded as applied.
pub fn run_migrations(db: &Database) -> Result<()> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )?;

    let applied: HashSet<String> = applied_versions(db)?.into_iter().collect();
    let dialect = db.dialect();
    let ctx = Context::background();

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        info!(version = migration.version, %dialect, "Applying migration");

        db.run_in_tx(&ctx, |tx| {
            if let Err(e) = tx.execute_batch(migration.sql(dialect)) {
                if dialect == Dialect::Sqlite && e.to_string().contains("duplicate column name") {
                    warn!(
                        version = migration.version,
                        "Migration partially applied (columns exist), marking complete"
                    );
                } else {
                    return Err(e);
                }
            }
            tx.exec(
                &format!(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?, {})",
                    dialect.now()
                ),
                &crate::args![migration.version],
            )?;
            Ok(())
        })
        .map_err(|e| Error::Migration {
            version: migration.version,
            source: Box::new(e),
        })?;

        info!(version = migration.version, "Migration complete");
    }

    Ok(())
}

/// Applied migration versions, oldest first.
///
/// # Errors
///
/// Returns an error if `schema_migrations` cannot be read.
pub fn applied_versions(db: &Database) -> Result<Vec<String>> {
    db.query("SELECT version FROM schema_migrations ORDER BY version", &[])?
        .iter()
        .map(|row| row.get::<String>(0))
        .collect()
}

/// Versions compiled into this binary, in apply order.
#[must_use]
pub fn known_versions() -> Vec<&'static str> {
    MIGRATIONS.iter().map(|m| m.version).collect()
}
