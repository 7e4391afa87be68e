//! Backend drivers.
//!
//! A [`Driver`] owns exactly one backend connection and executes
//! already-built SQL. It knows nothing about records; the
//! [`Database`](crate::storage::Database) wrapper layers locking,
//! transactions and migrations on top.

mod postgres;
mod sqlite;

pub use postgres::PostgresDriver;
pub use postgres::parse_dsn;
pub use sqlite::{DEFAULT_BUSY_TIMEOUT, SqliteDriver};

use crate::error::Result;
use crate::storage::context::Context;
use crate::storage::dialect::Dialect;
use crate::storage::value::{Row, Value};

/// Primitive statement execution against one backend connection.
///
/// Statements use logical `?` placeholders; drivers rebind them for their
/// dialect. When a [`Context`] is supplied the statement is aborted as soon
/// as the context is cancelled or its deadline passes.
pub trait Driver: Send {
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or `Cancelled`/`DeadlineExceeded`.
    fn execute(&self, sql: &str, args: &[Value], ctx: Option<&Context>) -> Result<u64>;

    /// Execute a statement and collect every result row.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or `Cancelled`/`DeadlineExceeded`.
    fn query(&self, sql: &str, args: &[Value], ctx: Option<&Context>) -> Result<Vec<Row>>;

    /// Run several parameterless statements separated by `;`.
    ///
    /// # Errors
    ///
    /// Returns the first failing statement's error.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backend refuses to open a transaction.
    fn begin(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction is then closed.
    fn commit(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(&self) -> Result<()>;
}
