//! Connection wrapper and transaction coordinator.
//!
//! [`Database`] owns one driver behind a mutex so it can be shared across
//! threads. [`Tx`] holds that mutex for its whole lifetime, which makes a
//! transaction scope exclusive to the thread that opened it.
//!
//! Record access code is written against [`Executor`], implemented by both,
//! so the same function runs standalone or inside a transaction depending on
//! which handle the caller passes.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result, ResultExt};
use crate::storage::context::Context;
use crate::storage::dialect::Dialect;
use crate::storage::driver::{DEFAULT_BUSY_TIMEOUT, Driver, PostgresDriver, SqliteDriver};
use crate::storage::migrations;
use crate::storage::value::{Row, Value};
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Statement execution shared by [`Database`] and [`Tx`].
pub trait Executor {
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn exec(&self, sql: &str, args: &[Value]) -> Result<u64>;

    /// Execute a statement and collect its rows.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// First row of the result, or `None` when the result is empty.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn query_opt(&self, sql: &str, args: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, args)?.into_iter().next())
    }

    /// Exactly the first row; an empty result is `NoRows`.
    ///
    /// # Errors
    ///
    /// Returns `NoRows` or the driver error.
    fn query_row(&self, sql: &str, args: &[Value]) -> Result<Row> {
        self.query_opt(sql, args)?.ok_or(Error::NoRows)
    }
}

/// A migrated database connection of either dialect.
pub struct Database {
    dialect: Dialect,
    driver: Mutex<Box<dyn Driver>>,
    tx_owner: Mutex<Option<ThreadId>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database described by `config` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or a migration fails.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        match config.dialect {
            Dialect::Sqlite => {
                let path = config.sqlite_path()?;
                let driver = SqliteDriver::open(&path, config.busy_timeout)?;
                Self::from_driver(Box::new(driver), Some(path)).migrated()
            }
            Dialect::Postgres => {
                let dsn = config.postgres_dsn()?;
                let driver = PostgresDriver::connect(dsn)?;
                Self::from_driver(Box::new(driver), None).migrated()
            }
        }
    }

    /// Open (or create) a SQLite database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a migration fails.
    pub fn open_sqlite(path: &Path) -> Result<Self> {
        let driver = SqliteDriver::open(path, DEFAULT_BUSY_TIMEOUT)?;
        Self::from_driver(Box::new(driver), Some(path.to_path_buf())).migrated()
    }

    /// Open a migrated in-memory SQLite database (for tests and scratch use).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let driver = SqliteDriver::open_in_memory()?;
        Self::from_driver(Box::new(driver), None).migrated()
    }

    /// Connect to Postgres and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the DSN is invalid, the server is unreachable, or
    /// a migration fails.
    pub fn open_postgres(dsn: &str) -> Result<Self> {
        let driver = PostgresDriver::connect(dsn)?;
        Self::from_driver(Box::new(driver), None).migrated()
    }

    /// Wrap an already-open driver without migrating.
    #[must_use]
    pub fn from_driver(driver: Box<dyn Driver>, path: Option<PathBuf>) -> Self {
        Self {
            dialect: driver.dialect(),
            driver: Mutex::new(driver),
            tx_owner: Mutex::new(None),
            path,
        }
    }

    fn migrated(self) -> Result<Self> {
        self.migrate()?;
        Ok(self)
    }

    /// Apply every pending migration for this dialect.
    ///
    /// # Errors
    ///
    /// Returns `Migration` for the first failing version; later versions are
    /// not attempted.
    pub fn migrate(&self) -> Result<()> {
        migrations::run_migrations(self)
    }

    /// Applied migration versions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the migration table cannot be read.
    pub fn schema_version(&self) -> Result<Vec<String>> {
        migrations::applied_versions(self)
    }

    /// Backing file for SQLite databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn current_thread_in_tx(&self) -> bool {
        *self.tx_owner.lock() == Some(thread::current().id())
    }

    fn lock_standalone(&self) -> Result<MutexGuard<'_, Box<dyn Driver>>> {
        if self.current_thread_in_tx() {
            return Err(Error::NestedTransaction);
        }
        Ok(self.driver.lock())
    }

    /// Run parameterless statements outside any transaction scope.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock_standalone()?.execute_batch(sql)
    }

    /// Open a transaction scope bound to `ctx`.
    ///
    /// Blocks while another thread holds a scope on this handle.
    ///
    /// # Errors
    ///
    /// Returns `NestedTransaction` if the calling thread already holds a
    /// scope on this handle, the context error if `ctx` is already done, or
    /// the driver error from `BEGIN`.
    pub fn begin(&self, ctx: &Context) -> Result<Tx<'_>> {
        if self.current_thread_in_tx() {
            return Err(Error::NestedTransaction);
        }
        ctx.check()?;

        let guard = self.driver.lock();
        guard.begin()?;
        *self.tx_owner.lock() = Some(thread::current().id());
        debug!(dialect = %self.dialect, "Transaction begun");

        Ok(Tx {
            db: self,
            guard,
            ctx: ctx.clone(),
            finished: false,
        })
    }

    /// Run `f` inside one transaction scope.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err`, when
    /// `ctx` is cancelled or expires, or when `f` panics (the scope's `Drop`
    /// rolls back during unwinding). A failed rollback is logged and the
    /// original error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, the context error, or the commit error.
    pub fn run_in_tx<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let tx = self.begin(ctx).op(|| "begin transaction")?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback_logged();
                Err(e)
            }
        }
    }
}

impl Executor for Database {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<u64> {
        self.lock_standalone()?.execute(sql, args, None)
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.lock_standalone()?.query(sql, args, None)
    }
}

/// One open transaction.
///
/// Exactly one of commit or rollback happens: explicitly through
/// [`Tx::commit`] / [`Tx::rollback`], or by rollback on drop.
pub struct Tx<'db> {
    db: &'db Database,
    guard: MutexGuard<'db, Box<dyn Driver>>,
    ctx: Context,
    finished: bool,
}

impl std::fmt::Debug for Tx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("dialect", &self.db.dialect)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Tx<'_> {
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run parameterless statements inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns the context error or the driver error.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ctx.check()?;
        self.guard.execute_batch(sql)
    }

    /// Commit, unless the context finished first (then roll back).
    ///
    /// # Errors
    ///
    /// Returns the context error or the commit error. A failed commit is
    /// followed by a best-effort rollback so the connection is left clean.
    pub fn commit(mut self) -> Result<()> {
        if let Err(e) = self.ctx.check() {
            self.rollback_logged();
            return Err(e);
        }
        self.finished = true;
        if let Err(e) = self.guard.commit() {
            if let Err(rb) = self.guard.rollback() {
                debug!(error = %rb, "Rollback after failed commit");
            }
            return Err(e).op(|| "commit transaction");
        }
        debug!("Transaction committed");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the driver error from `ROLLBACK`.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.guard.rollback().op(|| "rollback transaction")
    }

    fn rollback_logged(mut self) {
        self.finished = true;
        if let Err(e) = self.guard.rollback() {
            warn!(error = %e, "Rollback failed");
        } else {
            debug!("Transaction rolled back");
        }
    }
}

impl Executor for Tx<'_> {
    fn dialect(&self) -> Dialect {
        self.db.dialect
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<u64> {
        self.guard.execute(sql, args, Some(&self.ctx))
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.guard.query(sql, args, Some(&self.ctx))
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.guard.rollback() {
                warn!(error = %e, "Rollback of abandoned transaction failed");
            } else {
                debug!("Abandoned transaction rolled back");
            }
        }
        // Cleared before the guard is released so the next owner sees a clean slate.
        *self.db.tx_owner.lock() = None;
    }
}
