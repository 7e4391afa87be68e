//! Embedded SQLite driver built on rusqlite.

use super::Driver;
use crate::error::{Error, Result};
use crate::storage::context::Context;
use crate::storage::dialect::Dialect;
use crate::storage::value::{Row, Value};
use rusqlite::{Connection, params_from_iter};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Virtual machine instructions between cancellation checks.
const PROGRESS_OPS: i32 = 1000;

/// Default wait for a competing writer to release its lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite connection with WAL journaling and foreign keys enforced.
#[derive(Debug)]
pub struct SqliteDriver {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteDriver {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// Missing parent directories are created first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or connection cannot be created or
    /// the startup pragmas fail.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        configure(&conn, busy_timeout)?;
        debug!(path = %path.display(), "Opened SQLite database");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn, DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self { conn, path: None })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with the progress handler watching `ctx`.
    fn interruptible<T>(
        &self,
        ctx: Option<&Context>,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let Some(ctx) = ctx else {
            return f(&self.conn);
        };
        ctx.check()?;

        let watched = AssertUnwindSafe(ctx.clone());
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || watched.is_done()));
        let result = f(&self.conn);
        self.conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);

        match result {
            Err(Error::Sqlite(e))
                if e.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) =>
            {
                Err(ctx.done_error())
            }
            other => other,
        }
    }
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str, args: &[Value], ctx: Option<&Context>) -> Result<u64> {
        self.interruptible(ctx, |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let changed = stmt.execute(params_from_iter(args.iter()))?;
            Ok(changed as u64)
        })
    }

    fn query(&self, sql: &str, args: &[Value], ctx: Option<&Context>) -> Result<Vec<Row>> {
        self.interruptible(ctx, |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let columns = stmt.column_count();
            let mut rows = stmt.query(params_from_iter(args.iter()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns);
                for idx in 0..columns {
                    values.push(Value::try_from(row.get_ref(idx)?)?);
                }
                out.push(Row::new(values));
            }
            Ok(out)
        })
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        // Take the write lock up front so a later upgrade cannot deadlock.
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
