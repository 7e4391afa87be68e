//! Persistence layer for flowstore.
//!
//! One code path serves two backends:
//! - SQLite (embedded, WAL mode, single writer)
//! - Postgres (networked, concurrent writers)
//!
//! # Submodules
//!
//! - [`dialect`] - Per-backend SQL fragments and placeholder rebinding
//! - [`driver`] - Backend connections
//! - [`database`] - Connection wrapper and transaction coordinator
//! - [`migrations`] - Versioned schema
//! - [`events`] - Idempotent, append-only event log
//! - [`transcripts`] - Conversation records with cursor pagination and search
//! - [`tasks`], [`phases`], [`initiatives`], [`workflows`] - Record access
//! - [`dashboard`] - SQL-side aggregates

pub mod context;
pub mod dashboard;
pub mod database;
pub mod dialect;
pub mod driver;
pub mod events;
pub mod initiatives;
pub mod migrations;
pub mod phases;
pub mod tasks;
pub mod transcripts;
pub mod value;
pub mod workflows;

pub use context::Context;
pub use database::{Database, Executor, Tx};
pub use dialect::Dialect;
pub use events::{EventLog, EventLogWithTitle, EventType, QueryEventsOptions};
pub use transcripts::{Cursor, Direction, PaginatedTranscripts, PaginationOptions, Transcript};
pub use value::{FromValue, Row, Value};

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Render a record timestamp as stored (RFC 3339, UTC, whole seconds).
pub(crate) fn to_db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored record timestamp.
///
/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS` text produced by
/// [`Dialect::now`].
pub(crate) fn from_db_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::Other(format!("invalid stored timestamp '{s}'")))
}

pub(crate) fn opt_from_db_time(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.filter(|s| !s.is_empty()).as_deref().map(from_db_time).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_time_formats() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(to_db_time(&t), "2026-03-01T12:30:05Z");
        assert_eq!(from_db_time("2026-03-01T12:30:05Z").unwrap(), t);
        assert_eq!(from_db_time("2026-03-01 12:30:05").unwrap(), t);
        assert!(from_db_time("yesterday").is_err());
        assert_eq!(opt_from_db_time(Some(String::new())).unwrap(), None);
    }
}
