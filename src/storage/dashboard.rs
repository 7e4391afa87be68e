//! Dashboard aggregates computed in SQL.

use crate::args;
use crate::error::{Result, ResultExt};
use crate::model::TaskStatus;
use crate::storage::database::Executor;
use crate::storage::initiatives::get_initiative_titles;
use crate::storage::to_db_time;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: i64,
    pub created: i64,
    pub planned: i64,
    pub running: i64,
    pub paused: i64,
    pub blocked: i64,
    pub finalizing: i64,
    pub completed: i64,
    pub failed: i64,
    pub resolved: i64,
}

impl StatusCounts {
    fn slot(&mut self, status: TaskStatus) -> &mut i64 {
        match status {
            TaskStatus::Created => &mut self.created,
            TaskStatus::Planned => &mut self.planned,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Paused => &mut self.paused,
            TaskStatus::Blocked => &mut self.blocked,
            TaskStatus::Finalizing => &mut self.finalizing,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Resolved => &mut self.resolved,
        }
    }

    #[must_use]
    pub fn get(&self, status: TaskStatus) -> i64 {
        let mut copy = self.clone();
        *copy.slot(status)
    }
}

/// Phase spend for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCost {
    /// `YYYY-MM-DD`
    pub date: String,
    pub cost_usd: f64,
}

/// Task totals for one initiative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiativeStat {
    pub initiative_id: String,
    /// Empty when the initiative row is gone
    pub title: String,
    pub task_count: i64,
    pub completed_count: i64,
}

/// Count tasks by status with one `GROUP BY`.
///
/// Statuses outside [`TaskStatus`] count toward `total` only.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn status_counts<E: Executor + ?Sized>(db: &E) -> Result<StatusCounts> {
    let rows = db
        .query("SELECT status, COUNT(*) FROM tasks GROUP BY status", &[])
        .op(|| "dashboard status counts")?;

    let mut counts = StatusCounts::default();
    for row in &rows {
        let n: i64 = row.get(1)?;
        counts.total += n;
        if let Ok(status) = row.get::<String>(0)?.parse::<TaskStatus>() {
            *counts.slot(status) += n;
        }
    }
    Ok(counts)
}

/// Phase cost per completion day of the owning task, oldest day first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn cost_by_date<E: Executor + ?Sized>(db: &E, since: &DateTime<Utc>) -> Result<Vec<DailyCost>> {
    db.query(
        "SELECT SUBSTR(t.completed_at, 1, 10) AS day, SUM(p.cost_usd)
         FROM tasks t
         JOIN phases p ON p.task_id = t.id
         WHERE t.completed_at IS NOT NULL AND t.completed_at >= ?
         GROUP BY SUBSTR(t.completed_at, 1, 10)
         ORDER BY day",
        &args![to_db_time(since)],
    )
    .op(|| "dashboard cost by date")?
    .iter()
    .map(|row| {
        Ok(DailyCost {
            date: row.get(0)?,
            cost_usd: row.get(1)?,
        })
    })
    .collect()
}

/// Largest initiatives by task count, with titles loaded in one batch.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn initiative_stats<E: Executor + ?Sized>(db: &E, limit: u32) -> Result<Vec<InitiativeStat>> {
    let rows = db
        .query(
            "SELECT initiative_id,
                    COUNT(*),
                    CAST(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS BIGINT)
             FROM tasks
             WHERE initiative_id <> ''
             GROUP BY initiative_id
             ORDER BY COUNT(*) DESC, initiative_id
             LIMIT ?",
            &args![limit],
        )
        .op(|| "dashboard initiative stats")?;

    let mut stats = rows
        .iter()
        .map(|row| {
            Ok(InitiativeStat {
                initiative_id: row.get(0)?,
                title: String::new(),
                task_count: row.get(1)?,
                completed_count: row.get(2)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let ids: Vec<String> = stats.iter().map(|s| s.initiative_id.clone()).collect();
    let titles = get_initiative_titles(db, &ids)?;
    for stat in &mut stats {
        if let Some(title) = titles.get(&stat.initiative_id) {
            stat.title.clone_from(title);
        }
    }
    Ok(stats)
}
