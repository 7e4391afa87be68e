//! Configuration management.
//!
//! Resolves which backend to open and where it lives. Every setting follows
//! the same priority order:
//!
//! 1. Explicit CLI flag
//! 2. Environment variable (`FLOWSTORE_DIALECT`, `FLOWSTORE_DB`,
//!    `FLOWSTORE_DATABASE_URL`, `FLOWSTORE_BUSY_TIMEOUT_MS`)
//! 3. Default: SQLite at `<platform data dir>/flowstore.db`

use crate::error::{Error, Result};
use crate::storage::Dialect;
use crate::storage::driver::{DEFAULT_BUSY_TIMEOUT, parse_dsn};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DIALECT: &str = "FLOWSTORE_DIALECT";
pub const ENV_DB: &str = "FLOWSTORE_DB";
pub const ENV_DATABASE_URL: &str = "FLOWSTORE_DATABASE_URL";
pub const ENV_BUSY_TIMEOUT_MS: &str = "FLOWSTORE_BUSY_TIMEOUT_MS";

const DB_FILE_NAME: &str = "flowstore.db";

/// Explicit settings from the command line. `None` defers to the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub dialect: Option<&'a str>,
    pub db: Option<&'a Path>,
    pub dsn: Option<&'a str>,
}

/// Everything needed to open a [`crate::storage::Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub dialect: Dialect,
    /// Postgres connection string
    pub dsn: Option<String>,
    /// SQLite file; `None` means the platform default
    pub path: Option<PathBuf>,
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            dsn: None,
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    /// SQLite config for an explicit file.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Postgres config for a connection string.
    #[must_use]
    pub fn postgres(dsn: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::Postgres,
            dsn: Some(dsn.into()),
            ..Self::default()
        }
    }

    /// Resolve from CLI overrides and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown dialect and `Config` for an
    /// unparseable busy timeout.
    pub fn resolve(overrides: &Overrides<'_>) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with a caller-supplied environment lookup.
    ///
    /// When no dialect is named anywhere, a DSN alone selects Postgres.
    ///
    /// # Errors
    ///
    /// See [`DatabaseConfig::resolve`].
    pub fn resolve_with(
        overrides: &Overrides<'_>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let dsn = overrides
            .dsn
            .map(str::to_string)
            .or_else(|| env(ENV_DATABASE_URL));

        let dialect = match overrides.dialect.map(str::to_string).or_else(|| env(ENV_DIALECT)) {
            Some(name) => name.parse()?,
            None if dsn.is_some() => Dialect::Postgres,
            None => Dialect::Sqlite,
        };

        let path = overrides
            .db
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_DB).map(PathBuf::from));

        let busy_timeout = match env(ENV_BUSY_TIMEOUT_MS) {
            Some(ms) => ms
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| Error::Config(format!("{ENV_BUSY_TIMEOUT_MS} must be milliseconds, got '{ms}'")))?,
            None => DEFAULT_BUSY_TIMEOUT,
        };

        Ok(Self {
            dialect,
            dsn,
            path,
            busy_timeout,
        })
    }

    /// The SQLite file to open, falling back to the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no home directory can be determined.
    pub fn sqlite_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_db_path()
                .ok_or_else(|| Error::Config("cannot determine a data directory for the database file".to_string())),
        }
    }

    /// The validated Postgres connection string.
    ///
    /// # Errors
    ///
    /// Returns `Config` when no DSN is set or it does not parse.
    pub fn postgres_dsn(&self) -> Result<&str> {
        let dsn = self
            .dsn
            .as_deref()
            .ok_or_else(|| Error::Config("postgres dialect requires a dsn".to_string()))?;
        parse_dsn(dsn)?;
        Ok(dsn)
    }

    /// Human-readable location for status output. Passwords are not shown.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.dialect {
            Dialect::Sqlite => self
                .sqlite_path()
                .map_or_else(|_| "sqlite (no path)".to_string(), |p| p.display().to_string()),
            Dialect::Postgres => match self.dsn.as_deref().map(parse_dsn) {
                Some(Ok(cfg)) => {
                    let host = cfg.get_hosts().first().map_or_else(String::new, |h| match h {
                        tokio_postgres::config::Host::Tcp(name) => name.clone(),
                        #[cfg(unix)]
                        tokio_postgres::config::Host::Unix(path) => path.display().to_string(),
                    });
                    format!("postgres://{host}/{}", cfg.get_dbname().unwrap_or_default())
                }
                _ => "postgres (invalid dsn)".to_string(),
            },
        }
    }
}

/// Default database location: `<data dir>/flowstore.db`.
#[must_use]
pub fn default_db_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "flowstore").map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
}
