//! Append-only, deduplicated event log.
//!
//! Events reconstruct a task's execution timeline. Appends are idempotent:
//! the tuple (task, type, phase-or-empty, timestamp) is unique, and a repeat
//! of an existing tuple is dropped without error. Timestamps are written in
//! UTC with nanosecond precision because they are part of that key.

use crate::args;
use crate::error::{Result, ResultExt};
use crate::storage::context::Context;
use crate::storage::database::{Database, Executor};
use crate::storage::dialect::placeholders;
use crate::storage::value::{Row, Value};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Well-known event type tags. Free-form strings are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Phase,
    Transcript,
    Activity,
    Heartbeat,
    Tokens,
    Error,
    Complete,
    State,
    Warning,
    SessionUpdate,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Phase => "phase",
            Self::Transcript => "transcript",
            Self::Activity => "activity",
            Self::Heartbeat => "heartbeat",
            Self::Tokens => "tokens",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::State => "state",
            Self::Warning => "warning",
            Self::SessionUpdate => "session_update",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

/// One event log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// Assigned on insert; 0 when the append was a duplicate
    pub id: i64,
    pub task_id: String,
    /// Present only for phase-scoped events
    pub phase: Option<String>,
    pub iteration: Option<i64>,
    pub event_type: String,
    /// Schema-less payload; `None` and JSON `null` are both stored as SQL NULL
    pub data: Option<serde_json::Value>,
    /// Emitting component (e.g., "executor", "api")
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub duration_ms: Option<i64>,
}

impl EventLog {
    /// Create a new event stamped now (id will be assigned by database).
    #[must_use]
    pub fn new(task_id: impl Into<String>, event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: 0,
            task_id: task_id.into(),
            phase: None,
            iteration: None,
            event_type: event_type.into(),
            data: None,
            source: source.into(),
            created_at: Utc::now(),
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: i64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Attach a payload serialized from any `Serialize` value.
    ///
    /// # Errors
    ///
    /// Returns `Json` if the value cannot be represented as JSON.
    pub fn with_data<T: Serialize + ?Sized>(mut self, data: &T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Override the creation timestamp.
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    fn insert_args(&self) -> Result<Vec<Value>> {
        let data = match &self.data {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(serde_json::to_string(v)?),
        };
        Ok(args![
            &self.task_id,
            self.phase.as_deref(),
            self.iteration,
            &self.event_type,
            data,
            &self.source,
            format_event_timestamp(&self.created_at),
            self.duration_ms,
        ])
    }
}

/// An event with its task's title attached for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogWithTitle {
    #[serde(flatten)]
    pub event: EventLog,
    /// Empty when the task row no longer exists
    pub task_title: String,
}

/// Conjunctive filters for event queries.
///
/// `since`/`until` are inclusive. `limit == 0` returns every match, and
/// `offset` only applies together with a limit.
#[derive(Debug, Clone, Default)]
pub struct QueryEventsOptions {
    pub task_id: Option<String>,
    pub initiative_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub event_types: Vec<String>,
    pub limit: u32,
    pub offset: u32,
}

const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Older rows may carry lower-precision timestamps; newest format first.
const LEGACY_TIME_FORMATS: [&str; 3] = [EVENT_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.6f", "%Y-%m-%d %H:%M:%S"];

const INSERT_COLUMNS: [&str; 8] = [
    "task_id",
    "phase",
    "iteration",
    "event_type",
    "data",
    "source",
    "created_at",
    "duration_ms",
];

const SELECT_COLUMNS: &str =
    "e.id, e.task_id, e.phase, e.iteration, e.event_type, e.data, e.source, e.created_at, e.duration_ms";

/// Render an event timestamp in its stored form: UTC, nanosecond precision.
#[must_use]
pub fn format_event_timestamp(t: &DateTime<Utc>) -> String {
    t.format(EVENT_TIME_FORMAT).to_string()
}

/// Render an inclusive lower bound that sorts at or before every stored
/// spelling of the same instant.
///
/// Trailing fractional zeros are trimmed, so `10:00:00` precedes both
/// `10:00:00.000000` and `10:00:00.000000000`.
fn format_lower_bound(t: &DateTime<Utc>) -> String {
    let full = format_event_timestamp(t);
    full.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Parse a stored event timestamp.
///
/// Tries nanosecond, microsecond and second precision, then RFC 3339.
/// Anything else yields the Unix epoch so one bad row cannot fail a whole
/// result set.
#[must_use]
pub fn parse_event_timestamp(s: &str) -> DateTime<Utc> {
    LEGACY_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .unwrap_or_else(|| {
            debug!(value = s, "Unparseable event timestamp");
            DateTime::<Utc>::default()
        })
}

fn event_from_row(row: &Row) -> Result<EventLog> {
    let data = row.get::<Option<String>>(5)?.map(|raw| {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });
    Ok(EventLog {
        id: row.get(0)?,
        task_id: row.get(1)?,
        phase: row.get(2)?,
        iteration: row.get(3)?,
        event_type: row.get(4)?,
        data,
        source: row.get(6)?,
        created_at: parse_event_timestamp(&row.get::<String>(7)?),
        duration_ms: row.get(8)?,
    })
}

fn insert_sql<E: Executor + ?Sized>(db: &E) -> String {
    format!(
        "{} RETURNING id",
        db.dialect().insert_ignore("event_log", &INSERT_COLUMNS)
    )
}

fn insert_one<E: Executor + ?Sized>(db: &E, sql: &str, event: &EventLog) -> Result<i64> {
    let rows = db.query(sql, &event.insert_args()?)?;
    match rows.first() {
        Some(row) => row.get(0),
        None => {
            debug!(
                task_id = %event.task_id,
                event_type = %event.event_type,
                created_at = %format_event_timestamp(&event.created_at),
                "Duplicate event skipped"
            );
            Ok(0)
        }
    }
}

/// Append one event.
///
/// On insert `event.id` receives the new key. A duplicate of an existing
/// (task, type, phase, timestamp) tuple is silently skipped and leaves
/// `event.id` at 0.
///
/// # Errors
///
/// Returns `Json` if the payload cannot be serialized, or the statement
/// error (for example an unknown task).
pub fn save_event<E: Executor + ?Sized>(db: &E, event: &mut EventLog) -> Result<()> {
    event.id = insert_one(db, &insert_sql(db), event)
        .op(|| format!("save event {} for {}", event.event_type, event.task_id))?;
    Ok(())
}

/// Append events all-or-nothing in one transaction.
///
/// Duplicates are skipped per row, as in [`save_event`]. Ids are written
/// back only after the commit succeeds. Returns the number of rows inserted.
///
/// # Errors
///
/// Any failing row (including a payload serialization error) or a cancelled
/// context rolls back the entire batch.
pub fn save_events_batch(db: &Database, ctx: &Context, events: &mut [EventLog]) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }

    let ids = db
        .run_in_tx(ctx, |tx| {
            let sql = insert_sql(tx);
            events
                .iter()
                .map(|event| {
                    insert_one(tx, &sql, event)
                        .op(|| format!("save event {} for {}", event.event_type, event.task_id))
                })
                .collect::<Result<Vec<i64>>>()
        })
        .op(|| format!("save batch of {} events", events.len()))?;

    for (event, id) in events.iter_mut().zip(&ids) {
        event.id = *id;
    }
    Ok(ids.iter().filter(|id| **id > 0).count())
}

/// Build the WHERE clause and parameters shared by every event query.
fn filter_clause(opts: &QueryEventsOptions) -> (String, Vec<Value>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(task_id) = &opts.task_id {
        conditions.push("e.task_id = ?".to_string());
        params.push(task_id.into());
    }
    if let Some(initiative_id) = &opts.initiative_id {
        conditions.push("t.initiative_id = ?".to_string());
        params.push(initiative_id.into());
    }
    if let Some(since) = &opts.since {
        conditions.push("e.created_at >= ?".to_string());
        params.push(format_lower_bound(since).into());
    }
    if let Some(until) = &opts.until {
        conditions.push("e.created_at <= ?".to_string());
        params.push(format_event_timestamp(until).into());
    }
    if !opts.event_types.is_empty() {
        conditions.push(format!("e.event_type IN ({})", placeholders(opts.event_types.len())));
        params.extend(opts.event_types.iter().map(Value::from));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, params)
}

fn push_window(sql: &mut String, params: &mut Vec<Value>, opts: &QueryEventsOptions) {
    sql.push_str(" ORDER BY e.created_at DESC, e.id DESC");
    if opts.limit > 0 {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(opts.limit.into());
        params.push(opts.offset.into());
    }
}

/// The tasks join is only paid for when filtering by initiative.
fn from_clause(opts: &QueryEventsOptions) -> &'static str {
    if opts.initiative_id.is_some() {
        " FROM event_log e JOIN tasks t ON t.id = e.task_id"
    } else {
        " FROM event_log e"
    }
}

/// Events matching `opts`, newest first (id breaks timestamp ties).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn query_events<E: Executor + ?Sized>(db: &E, opts: &QueryEventsOptions) -> Result<Vec<EventLog>> {
    let (where_clause, mut params) = filter_clause(opts);
    let mut sql = format!("SELECT {SELECT_COLUMNS}{}{where_clause}", from_clause(opts));
    push_window(&mut sql, &mut params, opts);

    db.query(&sql, &params)
        .op(|| "query events")?
        .iter()
        .map(event_from_row)
        .collect()
}

/// Like [`query_events`], with each event's task title attached.
///
/// Events whose task row is missing are kept with an empty title.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn query_events_with_titles<E: Executor + ?Sized>(
    db: &E,
    opts: &QueryEventsOptions,
) -> Result<Vec<EventLogWithTitle>> {
    let (where_clause, mut params) = filter_clause(opts);
    let mut sql = format!(
        "SELECT {SELECT_COLUMNS}, COALESCE(t.title, '') FROM event_log e LEFT JOIN tasks t ON t.id = e.task_id{where_clause}"
    );
    push_window(&mut sql, &mut params, opts);

    db.query(&sql, &params)
        .op(|| "query events with titles")?
        .iter()
        .map(|row| {
            Ok(EventLogWithTitle {
                event: event_from_row(row)?,
                task_title: row.get(9)?,
            })
        })
        .collect()
}

/// Number of events matching the filters of `opts` (limit/offset ignored).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_events<E: Executor + ?Sized>(db: &E, opts: &QueryEventsOptions) -> Result<i64> {
    let (where_clause, params) = filter_clause(opts);
    let sql = format!("SELECT COUNT(*){}{where_clause}", from_clause(opts));
    db.query_row(&sql, &params).op(|| "count events")?.get(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Task;
    use crate::storage::tasks::{delete_task, save_task};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
    }

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        save_task(&db, &Task::new("T1", "First task").with_initiative("INIT-1")).unwrap();
        save_task(&db, &Task::new("T2", "Second task")).unwrap();
        db
    }

    fn for_task(task_id: &str) -> QueryEventsOptions {
        QueryEventsOptions {
            task_id: Some(task_id.to_string()),
            ..QueryEventsOptions::default()
        }
    }

    #[test]
    fn test_duplicate_append_is_noop() {
        let db = setup();
        let mut first = EventLog::new("T1", EventType::Phase, "executor")
            .with_phase("implement")
            .at(t0());
        let mut again = first.clone();

        save_event(&db, &mut first).unwrap();
        assert!(first.id > 0);

        save_event(&db, &mut again).expect("duplicate must not error");
        assert_eq!(again.id, 0);

        let events = query_events(&db, &for_task("T1")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, first.id);
    }

    #[test]
    fn test_dedup_key_components() {
        let db = setup();
        let base = EventLog::new("T1", EventType::Phase, "executor").at(t0());

        // Differing phase, type, task or nanosecond each make a new row.
        for mut event in [
            base.clone(),
            base.clone().with_phase("spec"),
            EventLog { event_type: "state".into(), ..base.clone() },
            EventLog { task_id: "T2".into(), ..base.clone() },
            base.clone().at(t0() + Duration::nanoseconds(1)),
        ] {
            save_event(&db, &mut event).unwrap();
            assert!(event.id > 0);
        }

        // No phase and an empty phase share the sentinel.
        let mut empty_phase = base.with_phase("");
        save_event(&db, &mut empty_phase).unwrap();
        assert_eq!(empty_phase.id, 0);

        assert_eq!(count_events(&db, &QueryEventsOptions::default()).unwrap(), 5);
    }

    #[test]
    fn test_nanosecond_precision_is_stored() {
        let db = setup();
        let at = t0() + Duration::nanoseconds(123_456_789);
        let mut event = EventLog::new("T1", EventType::Activity, "executor").at(at);
        save_event(&db, &mut event).unwrap();

        let raw: String = db
            .query_row("SELECT created_at FROM event_log WHERE id = ?", &args![event.id])
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(raw, "2026-02-01 09:00:00.123456789");
        assert_eq!(query_events(&db, &for_task("T1")).unwrap()[0].created_at, at);
    }

    #[test]
    fn test_since_until_window() {
        let db = setup();
        for h in 0..4 {
            let mut event = EventLog::new("T1", EventType::Heartbeat, "executor").at(t0() + Duration::hours(h));
            save_event(&db, &mut event).unwrap();
        }

        let opts = QueryEventsOptions {
            since: Some(t0() + Duration::minutes(30)),
            until: Some(t0() + Duration::minutes(90)),
            ..for_task("T1")
        };
        let events = query_events(&db, &opts).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].created_at, t0() + Duration::hours(1));
        assert_eq!(count_events(&db, &opts).unwrap(), 1);

        // Bounds are inclusive.
        let exact = QueryEventsOptions {
            since: Some(t0() + Duration::hours(1)),
            until: Some(t0() + Duration::hours(2)),
            ..for_task("T1")
        };
        assert_eq!(count_events(&db, &exact).unwrap(), 2);
    }

    #[test]
    fn test_bounds_include_lower_precision_rows() {
        let db = setup();
        for raw in ["2026-02-01 10:00:00", "2026-02-01 10:00:00.000000", "2026-02-01 11:00:00.250000"] {
            db.exec(
                "INSERT INTO event_log (task_id, event_type, source, created_at) VALUES (?, ?, ?, ?)",
                &args!["T1", "heartbeat", "legacy", raw],
            )
            .unwrap();
        }

        let at = |h: u32, ms: i64| t0() + Duration::hours(i64::from(h) - 9) + Duration::milliseconds(ms);
        let opts = QueryEventsOptions {
            since: Some(at(10, 0)),
            until: Some(at(11, 250)),
            ..for_task("T1")
        };
        assert_eq!(count_events(&db, &opts).unwrap(), 3);

        let later = QueryEventsOptions {
            since: Some(at(11, 250)),
            ..for_task("T1")
        };
        assert_eq!(query_events(&db, &later).unwrap().len(), 1);

        let past = QueryEventsOptions {
            since: Some(at(10, 0) + Duration::nanoseconds(1)),
            until: Some(at(11, 0)),
            ..for_task("T1")
        };
        assert_eq!(count_events(&db, &past).unwrap(), 0);
    }

    #[test]
    fn test_lower_bound_trims_zeros() {
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(format_lower_bound(&base), "2026-02-01 10:00:00");
        assert_eq!(
            format_lower_bound(&(base + Duration::milliseconds(250))),
            "2026-02-01 10:00:00.25"
        );
        assert_eq!(
            format_lower_bound(&(base + Duration::nanoseconds(7))),
            "2026-02-01 10:00:00.000000007"
        );
    }

    #[test]
    fn test_initiative_and_type_filters() {
        let db = setup();
        for (i, (task, kind)) in [("T1", "phase"), ("T1", "tokens"), ("T2", "phase"), ("T2", "error")]
            .into_iter()
            .enumerate()
        {
            let offset = i64::try_from(i).unwrap_or_default();
            let mut event = EventLog::new(task, kind, "executor").at(t0() + Duration::seconds(offset));
            save_event(&db, &mut event).unwrap();
        }

        let in_init = QueryEventsOptions {
            initiative_id: Some("INIT-1".to_string()),
            ..QueryEventsOptions::default()
        };
        let events = query_events(&db, &in_init).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.task_id == "T1"));
        assert_eq!(count_events(&db, &in_init).unwrap(), 2);

        let typed = QueryEventsOptions {
            event_types: vec!["phase".to_string(), "error".to_string()],
            ..QueryEventsOptions::default()
        };
        let kinds: Vec<_> = query_events(&db, &typed)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(kinds, ["error", "phase", "phase"]);
    }

    #[test]
    fn test_order_limit_offset() {
        let db = setup();
        // Three events sharing a timestamp must differ in type to coexist.
        for kind in ["a", "b", "c"] {
            let mut event = EventLog::new("T1", kind, "executor").at(t0());
            save_event(&db, &mut event).unwrap();
        }
        let mut later = EventLog::new("T1", "d", "executor").at(t0() + Duration::seconds(1));
        save_event(&db, &mut later).unwrap();

        let all = query_events(&db, &for_task("T1")).unwrap();
        let kinds: Vec<_> = all.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, ["d", "c", "b", "a"]);

        let page = query_events(
            &db,
            &QueryEventsOptions {
                limit: 2,
                offset: 1,
                ..for_task("T1")
            },
        )
        .unwrap();
        let kinds: Vec<_> = page.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, ["c", "b"]);

        // Offset without a limit is ignored.
        let unbounded = query_events(
            &db,
            &QueryEventsOptions {
                offset: 3,
                ..for_task("T1")
            },
        )
        .unwrap();
        assert_eq!(unbounded.len(), 4);
    }

    #[test]
    fn test_payloads() {
        let db = setup();
        let mut none = EventLog::new("T1", "a", "api").at(t0());
        let mut null = EventLog::new("T1", "b", "api").at(t0());
        null.data = Some(serde_json::Value::Null);
        let mut object = EventLog::new("T1", "c", "api")
            .at(t0())
            .with_data(&serde_json::json!({"tokens": 42, "tags": ["x"]}))
            .unwrap();
        let mut scalar = EventLog::new("T1", "d", "api").at(t0()).with_data("done").unwrap();

        for e in [&mut none, &mut null, &mut object, &mut scalar] {
            save_event(&db, e).unwrap();
        }

        let nulls: i64 = db
            .query_row("SELECT COUNT(*) FROM event_log WHERE data IS NULL", &[])
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(nulls, 2);

        let events = query_events(&db, &for_task("T1")).unwrap();
        let by_type = |t: &str| events.iter().find(|e| e.event_type == t).unwrap().data.clone();
        assert_eq!(by_type("a"), None);
        assert_eq!(by_type("b"), None);
        assert_eq!(by_type("c"), Some(serde_json::json!({"tags": ["x"], "tokens": 42})));
        assert_eq!(by_type("d"), Some(serde_json::json!("done")));
    }

    #[test]
    fn test_titles_variant_keeps_orphans() {
        let db = setup();
        let mut event = EventLog::new("T1", "a", "api").at(t0());
        save_event(&db, &mut event).unwrap();

        db.execute_batch("PRAGMA foreign_keys = OFF").unwrap();
        let mut orphan = EventLog::new("GHOST", "a", "api").at(t0());
        save_event(&db, &mut orphan).unwrap();

        let events = query_events_with_titles(&db, &QueryEventsOptions::default()).unwrap();
        assert_eq!(events.len(), 2);
        let title = |id: &str| {
            events
                .iter()
                .find(|e| e.event.task_id == id)
                .map(|e| e.task_title.clone())
                .unwrap()
        };
        assert_eq!(title("T1"), "First task");
        assert_eq!(title("GHOST"), "");
    }

    #[test]
    fn test_batch_counts_and_skips_duplicates() {
        let db = setup();
        let mut existing = EventLog::new("T1", "phase", "executor").at(t0());
        save_event(&db, &mut existing).unwrap();

        let mut batch = vec![
            existing.clone(),
            EventLog::new("T1", "phase", "executor").at(t0() + Duration::seconds(1)),
            EventLog::new("T2", "phase", "executor").at(t0()),
        ];
        let inserted = save_events_batch(&db, &Context::background(), &mut batch).unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(batch[0].id, 0);
        assert!(batch[1].id > 0 && batch[2].id > 0);
        assert_eq!(count_events(&db, &QueryEventsOptions::default()).unwrap(), 3);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let db = setup();
        let mut batch = vec![
            EventLog::new("T1", "phase", "executor").at(t0()),
            EventLog::new("NO-SUCH-TASK", "phase", "executor").at(t0()),
        ];
        let err = save_events_batch(&db, &Context::background(), &mut batch).unwrap_err();

        assert_eq!(err.error_code(), crate::error::ErrorCode::ConstraintViolation);
        assert!(batch.iter().all(|e| e.id == 0));
        assert_eq!(count_events(&db, &QueryEventsOptions::default()).unwrap(), 0);
    }

    #[test]
    fn test_batch_with_cancelled_context_writes_nothing() {
        let db = setup();
        let ctx = Context::background();
        ctx.cancel();
        let mut batch = vec![EventLog::new("T1", "phase", "executor").at(t0())];

        let err = save_events_batch(&db, &ctx, &mut batch).unwrap_err();
        assert!(matches!(err.root(), Error::Cancelled));
        assert_eq!(count_events(&db, &QueryEventsOptions::default()).unwrap(), 0);
    }

    #[test]
    fn test_cascade_on_task_delete() {
        let db = setup();
        let mut event = EventLog::new("T1", "phase", "executor").at(t0());
        save_event(&db, &mut event).unwrap();

        delete_task(&db, &Context::background(), "T1").unwrap();
        assert!(query_events(&db, &for_task("T1")).unwrap().is_empty());
        assert_eq!(count_events(&db, &for_task("T1")).unwrap(), 0);
    }

    #[test]
    fn test_parse_timestamp_precisions() {
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        assert_eq!(
            parse_event_timestamp("2026-02-01 09:00:00.000000123"),
            base + Duration::nanoseconds(123)
        );
        assert_eq!(
            parse_event_timestamp("2026-02-01 09:00:00.000123"),
            base + Duration::microseconds(123)
        );
        assert_eq!(parse_event_timestamp("2026-02-01 09:00:00"), base);
        assert_eq!(parse_event_timestamp("2026-02-01T09:00:00Z"), base);
        assert_eq!(parse_event_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
