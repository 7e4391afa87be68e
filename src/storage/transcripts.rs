//! Conversation transcripts: storage, cursor pagination, search, usage.
//!
//! Pagination walks the `(task_id, id)` index. A cursor names the last row
//! seen and the scan direction, so resuming costs one index seek no matter
//! how deep the page is.

use crate::args;
use crate::error::{Error, Result, ResultExt};
use crate::storage::context::Context;
use crate::storage::database::{Database, Executor};
use crate::storage::value::{Row, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Page size when the caller asks for 0.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Hard cap on any requested page size.
pub const MAX_PAGE_SIZE: u32 = 200;
/// Row cap for full-text search.
pub const SEARCH_LIMIT: u32 = 50;

/// One stored conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Assigned on insert
    pub id: i64,
    pub task_id: String,
    pub phase: String,
    pub session_id: String,
    pub message_uuid: String,
    /// Threading: the message this one replies to
    pub parent_uuid: Option<String>,
    /// "user", "assistant", "queue-operation", "hook"
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    /// Full content JSON
    pub content: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    /// JSON array of tool_use blocks
    pub tool_calls: String,
    pub tool_results: String,
    /// Millisecond precision
    pub timestamp: DateTime<Utc>,
}

impl Transcript {
    /// A new message with a fresh UUID, stamped now.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        phase: impl Into<String>,
        message_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            task_id: task_id.into(),
            phase: phase.into(),
            session_id: String::new(),
            message_uuid: uuid::Uuid::new_v4().to_string(),
            parent_uuid: None,
            message_type: message_type.into(),
            role: String::new(),
            content: content.into(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            tool_calls: String::new(),
            tool_results: String::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Scan order for paginated reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    const fn sql_order(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    const fn sql_after(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(Error::InvalidArgument(format!("unknown direction '{other}'"))),
        }
    }
}

/// Resume point for a paginated scan.
///
/// Rendered as an opaque token; pass it back verbatim. Tokens are not stable
/// across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Last id already returned in `direction`
    pub id: i64,
    pub direction: Direction,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.direction.as_str(), self.id)
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("invalid cursor '{s}'"));
        let (direction, id) = s.split_once('.').ok_or_else(invalid)?;
        let direction = match direction {
            "asc" => Direction::Asc,
            "desc" => Direction::Desc,
            _ => return Err(invalid()),
        };
        let id = id.parse::<i64>().map_err(|_| invalid())?;
        Ok(Self { id, direction })
    }
}

/// Options for [`get_transcripts_paginated`].
#[derive(Debug, Clone, Default)]
pub struct PaginationOptions {
    pub phase: Option<String>,
    /// 0 means [`DEFAULT_PAGE_SIZE`]; capped at [`MAX_PAGE_SIZE`]
    pub limit: u32,
    /// Token from a previous page; its direction overrides `direction`
    pub cursor: Option<String>,
    pub direction: Direction,
}

/// One page of transcripts with navigation tokens.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedTranscripts {
    pub transcripts: Vec<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Present only when earlier rows exist, so the first page never has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
    pub has_more: bool,
    /// Rows matching the filter, ignoring the page window
    pub total_count: i64,
}

/// Transcript count for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub transcript_count: i64,
}

/// Summed assistant-message token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub task_id: String,
    /// Empty for task-wide totals
    pub phase: String,
    pub total_input: i64,
    pub total_output: i64,
    pub total_cache_creation: i64,
    pub total_cache_read: i64,
    pub message_count: i64,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptMatch {
    pub id: i64,
    pub task_id: String,
    pub phase: String,
    pub session_id: String,
    pub snippet: String,
    /// Lower is better on SQLite; always 0 on Postgres
    pub rank: f64,
}

const INSERT_COLUMNS: [&str; 16] = [
    "task_id",
    "phase",
    "session_id",
    "message_uuid",
    "parent_uuid",
    "type",
    "role",
    "content",
    "model",
    "input_tokens",
    "output_tokens",
    "cache_creation_tokens",
    "cache_read_tokens",
    "tool_calls",
    "tool_results",
    "timestamp",
];

fn select_sql() -> String {
    format!("SELECT id, {} FROM transcripts", INSERT_COLUMNS.join(", "))
}

fn transcript_from_row(row: &Row) -> Result<Transcript> {
    Ok(Transcript {
        id: row.get(0)?,
        task_id: row.get(1)?,
        phase: row.get(2)?,
        session_id: row.get(3)?,
        message_uuid: row.get(4)?,
        parent_uuid: row.get(5)?,
        message_type: row.get(6)?,
        role: row.get(7)?,
        content: row.get(8)?,
        model: row.get(9)?,
        input_tokens: row.get(10)?,
        output_tokens: row.get(11)?,
        cache_creation_tokens: row.get(12)?,
        cache_read_tokens: row.get(13)?,
        tool_calls: row.get(14)?,
        tool_results: row.get(15)?,
        timestamp: DateTime::from_timestamp_millis(row.get(16)?).unwrap_or_default(),
    })
}

fn collect<E: Executor + ?Sized>(db: &E, sql: &str, params: &[Value]) -> Result<Vec<Transcript>> {
    db.query(sql, params)?.iter().map(transcript_from_row).collect()
}

fn insert_one<E: Executor + ?Sized>(db: &E, t: &Transcript) -> Result<i64> {
    let sql = format!(
        "INSERT INTO transcripts ({}) VALUES ({}) RETURNING id",
        INSERT_COLUMNS.join(", "),
        crate::storage::dialect::placeholders(INSERT_COLUMNS.len())
    );
    db.query_row(
        &sql,
        &args![
            &t.task_id,
            &t.phase,
            &t.session_id,
            &t.message_uuid,
            t.parent_uuid.as_deref(),
            &t.message_type,
            &t.role,
            &t.content,
            &t.model,
            t.input_tokens,
            t.output_tokens,
            t.cache_creation_tokens,
            t.cache_read_tokens,
            &t.tool_calls,
            &t.tool_results,
            t.timestamp.timestamp_millis(),
        ],
    )?
    .get(0)
}

/// Store one message; `t.id` receives the new key.
///
/// # Errors
///
/// Returns an error if the insert fails (for example an unknown task).
pub fn add_transcript<E: Executor + ?Sized>(db: &E, t: &mut Transcript) -> Result<()> {
    t.id = insert_one(db, t).op(|| format!("add transcript for {}", t.task_id))?;
    Ok(())
}

/// Store messages all-or-nothing in one transaction.
///
/// Ids are written back only after the commit succeeds.
///
/// # Errors
///
/// Any failing row or a cancelled context rolls back the whole batch.
pub fn add_transcripts_batch(db: &Database, ctx: &Context, batch: &mut [Transcript]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let ids = db
        .run_in_tx(ctx, |tx| {
            batch
                .iter()
                .map(|t| insert_one(tx, t))
                .collect::<Result<Vec<i64>>>()
        })
        .op(|| format!("add batch of {} transcripts", batch.len()))?;

    for (t, id) in batch.iter_mut().zip(ids) {
        t.id = id;
    }
    debug!(count = batch.len(), "Transcript batch stored");
    Ok(())
}

/// Every message of a task in conversation order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_transcripts<E: Executor + ?Sized>(db: &E, task_id: &str) -> Result<Vec<Transcript>> {
    collect(
        db,
        &format!("{} WHERE task_id = ? ORDER BY timestamp, id", select_sql()),
        &args![task_id],
    )
    .op(|| format!("get transcripts for {task_id}"))
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_transcripts_by_phase<E: Executor + ?Sized>(
    db: &E,
    task_id: &str,
    phase: &str,
) -> Result<Vec<Transcript>> {
    collect(
        db,
        &format!("{} WHERE task_id = ? AND phase = ? ORDER BY timestamp, id", select_sql()),
        &args![task_id, phase],
    )
    .op(|| format!("get transcripts for {task_id}/{phase}"))
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_transcripts_by_session<E: Executor + ?Sized>(db: &E, session_id: &str) -> Result<Vec<Transcript>> {
    collect(
        db,
        &format!("{} WHERE session_id = ? ORDER BY timestamp, id", select_sql()),
        &args![session_id],
    )
    .op(|| format!("get transcripts for session {session_id}"))
}

/// The newest message of a task, if any.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_latest_transcript<E: Executor + ?Sized>(db: &E, task_id: &str) -> Result<Option<Transcript>> {
    db.query_opt(
        &format!("{} WHERE task_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1", select_sql()),
        &args![task_id],
    )
    .op(|| format!("get latest transcript for {task_id}"))?
    .as_ref()
    .map(transcript_from_row)
    .transpose()
}

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn effective_limit(requested: u32) -> u32 {
    match requested {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    }
}

struct PageQuery {
    sql: String,
    params: Vec<Value>,
    filter: String,
    filter_params: Vec<Value>,
    limit: u32,
    direction: Direction,
    cursor: Option<Cursor>,
}

fn build_page_query(task_id: &str, opts: &PaginationOptions) -> Result<PageQuery> {
    let cursor = opts.cursor.as_deref().map(str::parse::<Cursor>).transpose()?;
    let direction = cursor.map_or(opts.direction, |c| c.direction);
    let limit = effective_limit(opts.limit);

    let mut filter = String::from(" WHERE task_id = ?");
    let mut filter_params = args![task_id];
    if let Some(phase) = &opts.phase {
        filter.push_str(" AND phase = ?");
        filter_params.push(phase.into());
    }

    let mut sql = format!("{}{filter}", select_sql());
    let mut params = filter_params.clone();
    if let Some(c) = cursor {
        sql.push_str(&format!(" AND id {} ?", direction.sql_after()));
        params.push(c.id.into());
    }
    // One extra row tells us whether another page exists.
    sql.push_str(&format!(" ORDER BY id {} LIMIT ?", direction.sql_order()));
    params.push((limit + 1).into());

    Ok(PageQuery {
        sql,
        params,
        filter,
        filter_params,
        limit,
        direction,
        cursor,
    })
}

/// One page of a task's transcripts.
///
/// Pages follow id order in the scan direction. `next_cursor` is set when
/// more rows follow; passing it back resumes right after this page's last
/// row. `prev_cursor` is set when rows precede this page in the scan
/// direction and walks back toward the start, in the reverse direction.
///
/// # Errors
///
/// Returns `InvalidArgument` for a malformed cursor, or the query error.
pub fn get_transcripts_paginated<E: Executor + ?Sized>(
    db: &E,
    task_id: &str,
    opts: &PaginationOptions,
) -> Result<PaginatedTranscripts> {
    let page = build_page_query(task_id, opts)?;

    let mut transcripts =
        collect(db, &page.sql, &page.params).op(|| format!("paginate transcripts for {task_id}"))?;
    let total_count: i64 = db
        .query_row(&format!("SELECT COUNT(*) FROM transcripts{}", page.filter), &page.filter_params)
        .op(|| format!("count transcripts for {task_id}"))?
        .get(0)?;

    let limit = page.limit as usize;
    let has_more = transcripts.len() > limit;
    transcripts.truncate(limit);

    let next_cursor = has_more
        .then(|| transcripts.last())
        .flatten()
        .map(|last| Cursor { id: last.id, direction: page.direction }.to_string());

    let prev_cursor = match page.cursor {
        Some(c) => {
            // Anchor at this page's first row; an empty page anchors just past
            // the incoming cursor so the reverse scan includes its row.
            let anchor = transcripts.first().map_or(
                match page.direction {
                    Direction::Asc => c.id.saturating_add(1),
                    Direction::Desc => c.id.saturating_sub(1),
                },
                |first| first.id,
            );
            let back = page.direction.reverse();
            let mut params = page.filter_params.clone();
            params.push(anchor.into());
            let earlier = db
                .query_opt(
                    &format!("SELECT id FROM transcripts{} AND id {} ? LIMIT 1", page.filter, back.sql_after()),
                    &params,
                )
                .op(|| format!("look for transcripts before {task_id} page"))?;
            earlier.map(|_| Cursor { id: anchor, direction: back }.to_string())
        }
        None => None,
    };

    Ok(PaginatedTranscripts {
        transcripts,
        next_cursor,
        prev_cursor,
        has_more,
        total_count,
    })
}

/// Transcript counts per phase, in the order phases first appeared.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_phase_summary<E: Executor + ?Sized>(db: &E, task_id: &str) -> Result<Vec<PhaseSummary>> {
    db.query(
        "SELECT phase, COUNT(*) FROM transcripts WHERE task_id = ? GROUP BY phase ORDER BY MIN(timestamp), MIN(id)",
        &args![task_id],
    )
    .op(|| format!("get phase summary for {task_id}"))?
    .iter()
    .map(|row| {
        Ok(PhaseSummary {
            phase: row.get(0)?,
            transcript_count: row.get(1)?,
        })
    })
    .collect()
}

fn token_usage<E: Executor + ?Sized>(db: &E, task_id: &str, phase: Option<&str>) -> Result<TokenUsage> {
    let mut sql = String::from(
        "SELECT CAST(COALESCE(SUM(input_tokens), 0) AS BIGINT),
                CAST(COALESCE(SUM(output_tokens), 0) AS BIGINT),
                CAST(COALESCE(SUM(cache_creation_tokens), 0) AS BIGINT),
                CAST(COALESCE(SUM(cache_read_tokens), 0) AS BIGINT),
                COUNT(*)
         FROM transcripts
         WHERE task_id = ? AND type = 'assistant'",
    );
    let mut params = args![task_id];
    if let Some(phase) = phase {
        sql.push_str(" AND phase = ?");
        params.push(phase.into());
    }

    let row = db.query_row(&sql, &params)?;
    Ok(TokenUsage {
        task_id: task_id.to_string(),
        phase: phase.unwrap_or_default().to_string(),
        total_input: row.get(0)?,
        total_output: row.get(1)?,
        total_cache_creation: row.get(2)?,
        total_cache_read: row.get(3)?,
        message_count: row.get(4)?,
    })
}

/// Token totals over a task's assistant messages. Zero when there are none.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_task_token_usage<E: Executor + ?Sized>(db: &E, task_id: &str) -> Result<TokenUsage> {
    token_usage(db, task_id, None).op(|| format!("get token usage for {task_id}"))
}

/// Token totals over one phase's assistant messages.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_phase_token_usage<E: Executor + ?Sized>(db: &E, task_id: &str, phase: &str) -> Result<TokenUsage> {
    token_usage(db, task_id, Some(phase)).op(|| format!("get token usage for {task_id}/{phase}"))
}

/// Full-text search over message content.
///
/// Ranking and snippet quality depend on the dialect: SQLite ranks with
/// FTS5, Postgres returns unranked `ILIKE` matches newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn search_transcripts<E: Executor + ?Sized>(db: &E, term: &str) -> Result<Vec<TranscriptMatch>> {
    if term.trim().is_empty() {
        return Ok(Vec::new());
    }
    let (sql, params) = db.dialect().full_text_search(term, SEARCH_LIMIT);
    db.query(&sql, &params)
        .op(|| format!("search transcripts for '{term}'"))?
        .iter()
        .map(|row| {
            Ok(TranscriptMatch {
                id: row.get(0)?,
                task_id: row.get(1)?,
                phase: row.get(2)?,
                session_id: row.get(3)?,
                snippet: row.get_string_or_default(4)?,
                rank: row.get(5)?,
            })
        })
        .collect()
}

/// Delete messages older than `older_than`, returning how many went.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn cleanup_old_transcripts<E: Executor + ?Sized>(db: &E, older_than: chrono::Duration) -> Result<u64> {
    let cutoff = (Utc::now() - older_than).timestamp_millis();
    db.exec("DELETE FROM transcripts WHERE timestamp < ?", &args![cutoff])
        .op(|| "cleanup old transcripts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use crate::storage::tasks::{delete_task, save_task};
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    /// Six messages for T1: spec x2, implement x3, review x1.
    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        save_task(&db, &Task::new("T1", "Paginate me")).unwrap();
        save_task(&db, &Task::new("T2", "Other")).unwrap();

        let phases = ["spec", "spec", "implement", "implement", "implement", "review"];
        let mut batch: Vec<Transcript> = phases
            .iter()
            .enumerate()
            .map(|(i, phase)| {
                let offset = i64::try_from(i).unwrap_or_default();
                let mut t = Transcript::new("T1", *phase, "assistant", format!("message {i} about {phase}"));
                t.session_id = "sess-1".to_string();
                t.timestamp = t0() + Duration::seconds(offset);
                t.input_tokens = 10;
                t.output_tokens = 5;
                t
            })
            .collect();
        add_transcripts_batch(&db, &Context::background(), &mut batch).unwrap();

        let mut other = Transcript::new("T2", "spec", "user", "unrelated");
        add_transcript(&db, &mut other).unwrap();
        db
    }

    fn ids(page: &PaginatedTranscripts) -> Vec<i64> {
        page.transcripts.iter().map(|t| t.id).collect()
    }

    fn page(db: &Database, limit: u32, cursor: Option<String>, direction: Direction) -> PaginatedTranscripts {
        get_transcripts_paginated(
            db,
            "T1",
            &PaginationOptions {
                limit,
                cursor,
                direction,
                ..PaginationOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_cursor_pages_have_no_overlap_or_gap() {
        let db = setup();
        let all: Vec<i64> = get_transcripts(&db, "T1").unwrap().iter().map(|t| t.id).collect();
        assert_eq!(all.len(), 6);

        let first = page(&db, 2, None, Direction::Asc);
        assert_eq!(ids(&first), all[..2]);
        assert!(first.has_more);
        assert_eq!(first.total_count, 6);
        assert!(first.prev_cursor.is_none());

        let second = page(&db, 2, first.next_cursor.clone(), Direction::Asc);
        assert_eq!(ids(&second), all[2..4]);
        assert!(second.prev_cursor.is_some());
        let seen: HashSet<_> = ids(&first).into_iter().collect();
        assert!(ids(&second).iter().all(|id| !seen.contains(id)));

        let third = page(&db, 2, second.next_cursor.clone(), Direction::Asc);
        assert_eq!(ids(&third), all[4..]);
        assert!(!third.has_more);
        assert!(third.next_cursor.is_none());

        let stitched: Vec<i64> = [first, second, third].iter().flat_map(ids).collect();
        assert_eq!(stitched, all);
    }

    #[test]
    fn test_prev_cursor_walks_back() {
        let db = setup();
        let first = page(&db, 2, None, Direction::Asc);
        let second = page(&db, 2, first.next_cursor.clone(), Direction::Asc);

        let back = page(&db, 2, second.prev_cursor.clone(), Direction::Asc);
        let mut back_ids = ids(&back);
        back_ids.reverse();
        assert_eq!(back_ids, ids(&first));
    }

    #[test]
    fn test_asc_desc_mirror() {
        let db = setup();
        let asc = ids(&page(&db, 0, None, Direction::Asc));
        let desc = ids(&page(&db, 0, None, Direction::Desc));
        assert_eq!(asc.len(), desc.len());
        assert_eq!(asc.first(), desc.last());
        assert_eq!(asc.last(), desc.first());

        let mut reversed = desc.clone();
        reversed.reverse();
        assert_eq!(asc, reversed);

        // Desc pagination covers the same rows.
        let d1 = page(&db, 4, None, Direction::Desc);
        let d2 = page(&db, 4, d1.next_cursor.clone(), Direction::Desc);
        let stitched: Vec<i64> = ids(&d1).into_iter().chain(ids(&d2)).collect();
        assert_eq!(stitched, desc);
    }

    #[test]
    fn test_phase_filter_and_total() {
        let db = setup();
        let result = get_transcripts_paginated(
            &db,
            "T1",
            &PaginationOptions {
                phase: Some("implement".to_string()),
                limit: 2,
                ..PaginationOptions::default()
            },
        )
        .unwrap();
        assert_eq!(result.transcripts.len(), 2);
        assert_eq!(result.total_count, 3);
        assert!(result.has_more);
        assert!(result.transcripts.iter().all(|t| t.phase == "implement"));
    }

    #[test]
    fn test_limit_default_and_cap() {
        assert_eq!(effective_limit(0), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_limit(10), 10);
        assert_eq!(effective_limit(10_000), MAX_PAGE_SIZE);

        let db = Database::open_in_memory().unwrap();
        save_task(&db, &Task::new("BIG", "Many messages")).unwrap();
        let mut batch: Vec<Transcript> = (0..205)
            .map(|i| Transcript::new("BIG", "implement", "assistant", format!("m{i}")))
            .collect();
        add_transcripts_batch(&db, &Context::background(), &mut batch).unwrap();

        let opts = |limit| PaginationOptions {
            limit,
            ..PaginationOptions::default()
        };
        let default = get_transcripts_paginated(&db, "BIG", &opts(0)).unwrap();
        assert_eq!(default.transcripts.len(), 50);
        let capped = get_transcripts_paginated(&db, "BIG", &opts(1_000)).unwrap();
        assert_eq!(capped.transcripts.len(), 200);
        assert!(capped.has_more);
        assert_eq!(capped.total_count, 205);
    }

    #[test]
    fn test_empty_page_after_last_cursor() {
        let db = setup();
        let all = page(&db, 6, None, Direction::Asc);
        let last_id = *ids(&all).last().unwrap();

        let cursor = Cursor { id: last_id, direction: Direction::Asc }.to_string();
        let empty = page(&db, 2, Some(cursor), Direction::Asc);
        assert!(empty.transcripts.is_empty());
        assert!(!empty.has_more);

        let back = page(&db, 2, empty.prev_cursor.clone(), Direction::Asc);
        assert_eq!(ids(&back)[0], last_id);
    }

    #[test]
    fn test_no_prev_cursor_when_nothing_precedes() {
        let db = setup();
        let all: Vec<i64> = get_transcripts(&db, "T1").unwrap().iter().map(|t| t.id).collect();

        let from_zero = page(&db, 2, Some("asc.0".to_string()), Direction::Asc);
        assert_eq!(ids(&from_zero), all[..2]);
        assert!(from_zero.prev_cursor.is_none());
        assert!(from_zero.next_cursor.is_some());

        // Walking back from the second page lands on the first rows, which
        // have nothing beyond them in the reverse scan.
        let second = page(&db, 2, from_zero.next_cursor.clone(), Direction::Asc);
        let back = page(&db, 2, second.prev_cursor.clone(), Direction::Asc);
        assert_eq!(ids(&back), vec![all[1], all[0]]);
        assert!(!back.has_more);
        assert!(back.next_cursor.is_none());
    }

    #[test]
    fn test_extreme_cursor_ids_do_not_overflow() {
        let db = setup();
        let last = get_transcripts(&db, "T1").unwrap().iter().map(|t| t.id).max().unwrap();

        let past_end = page(&db, 2, Some(format!("asc.{}", i64::MAX)), Direction::Asc);
        assert!(past_end.transcripts.is_empty());
        let back = page(&db, 2, past_end.prev_cursor.clone(), Direction::Asc);
        assert_eq!(ids(&back)[0], last);

        let before_start = page(&db, 2, Some(format!("desc.{}", i64::MIN)), Direction::Desc);
        assert!(before_start.transcripts.is_empty());
        assert!(!before_start.has_more);
        assert!(before_start.prev_cursor.is_some());
    }

    #[test]
    fn test_cursor_token_round_trip_and_rejects_garbage() {
        let c = Cursor { id: 42, direction: Direction::Desc };
        assert_eq!(c.to_string().parse::<Cursor>().unwrap(), c);
        for bad in ["", "42", "sideways.3", "asc.x"] {
            assert!(bad.parse::<Cursor>().is_err(), "{bad}");
        }

        let db = setup();
        let err = get_transcripts_paginated(
            &db,
            "T1",
            &PaginationOptions {
                cursor: Some("nope".to_string()),
                ..PaginationOptions::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.error_code(), crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_cursor_scan_uses_task_index() {
        let db = setup();
        for opts in [
            PaginationOptions {
                cursor: Some("asc.2".to_string()),
                limit: 2,
                ..PaginationOptions::default()
            },
            PaginationOptions {
                direction: Direction::Desc,
                ..PaginationOptions::default()
            },
            PaginationOptions {
                phase: Some("implement".to_string()),
                cursor: Some("desc.5".to_string()),
                ..PaginationOptions::default()
            },
        ] {
            let query = build_page_query("T1", &opts).unwrap();
            let plan: Vec<String> = db
                .query(&format!("EXPLAIN QUERY PLAN {}", query.sql), &query.params)
                .unwrap()
                .iter()
                .map(|row| row.get::<String>(3).unwrap())
                .collect();
            let plan = plan.join("\n");
            assert!(
                plan.contains("USING INDEX idx_transcripts_task")
                    || plan.contains("USING COVERING INDEX idx_transcripts_task"),
                "unexpected plan: {plan}"
            );
            assert!(!plan.contains("USE TEMP B-TREE"), "sorts instead of walking the index: {plan}");
        }
    }

    #[test]
    fn test_phase_summary_and_usage() {
        let db = setup();
        let summary = get_phase_summary(&db, "T1").unwrap();
        assert_eq!(
            summary,
            vec![
                PhaseSummary { phase: "spec".into(), transcript_count: 2 },
                PhaseSummary { phase: "implement".into(), transcript_count: 3 },
                PhaseSummary { phase: "review".into(), transcript_count: 1 },
            ]
        );

        let usage = get_task_token_usage(&db, "T1").unwrap();
        assert_eq!(usage.message_count, 6);
        assert_eq!(usage.total_input, 60);
        assert_eq!(usage.total_output, 30);

        let phase = get_phase_token_usage(&db, "T1", "implement").unwrap();
        assert_eq!(phase.message_count, 3);
        assert_eq!(phase.phase, "implement");

        // User messages do not count; no assistant rows means zeros, not an error.
        assert_eq!(get_task_token_usage(&db, "T2").unwrap().message_count, 0);
    }

    #[test]
    fn test_lookups() {
        let db = setup();
        assert_eq!(get_transcripts_by_phase(&db, "T1", "spec").unwrap().len(), 2);
        assert_eq!(get_transcripts_by_session(&db, "sess-1").unwrap().len(), 6);
        let latest = get_latest_transcript(&db, "T1").unwrap().unwrap();
        assert_eq!(latest.phase, "review");
        assert_eq!(latest.timestamp, t0() + Duration::seconds(5));
        assert!(get_latest_transcript(&db, "NONE").unwrap().is_none());
    }

    #[test]
    fn test_search() {
        let db = setup();
        let hits = search_transcripts(&db, "implement").unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.task_id == "T1" && h.phase == "implement"));
        assert!(hits[0].snippet.contains("<mark>"));

        // FTS operators in user input are treated as plain text.
        assert!(search_transcripts(&db, "\"unbalanced AND").unwrap().is_empty());
        assert!(search_transcripts(&db, "  ").unwrap().is_empty());
    }

    #[test]
    fn test_cascade_and_cleanup() {
        let db = setup();
        delete_task(&db, &Context::background(), "T1").unwrap();
        assert!(get_transcripts(&db, "T1").unwrap().is_empty());
        assert!(search_transcripts(&db, "implement").unwrap().is_empty());

        // The remaining T2 message was stamped now; a 1-hour horizon keeps it.
        assert_eq!(cleanup_old_transcripts(&db, Duration::hours(1)).unwrap(), 0);
        assert_eq!(cleanup_old_transcripts(&db, Duration::hours(-1)).unwrap(), 1);
    }

    #[test]
    fn test_batch_rolls_back_on_bad_row() {
        let db = setup();
        let mut batch = vec![
            Transcript::new("T1", "spec", "user", "ok"),
            Transcript::new("MISSING", "spec", "user", "bad"),
        ];
        assert!(add_transcripts_batch(&db, &Context::background(), &mut batch).is_err());
        assert!(batch.iter().all(|t| t.id == 0));
        assert_eq!(get_transcripts(&db, "T1").unwrap().len(), 6);
    }
}
