//! Per-task phase state.

use crate::args;
use crate::error::{Result, ResultExt};
use crate::model::Phase;
use crate::storage::database::Executor;
use crate::storage::value::Row;
use crate::storage::{opt_from_db_time, to_db_time};

const COLUMNS: [&str; 8] = [
    "task_id",
    "phase_id",
    "status",
    "iterations",
    "started_at",
    "completed_at",
    "cost_usd",
    "error_message",
];

fn phase_from_row(row: &Row) -> Result<Phase> {
    Ok(Phase {
        task_id: row.get(0)?,
        phase_id: row.get(1)?,
        status: row.get(2)?,
        iterations: row.get(3)?,
        started_at: opt_from_db_time(row.get(4)?)?,
        completed_at: opt_from_db_time(row.get(5)?)?,
        cost_usd: row.get(6)?,
        error_message: row.get(7)?,
    })
}

/// Insert or update the phase keyed on (task, phase).
///
/// # Errors
///
/// Returns a constraint error if the task does not exist.
pub fn save_phase<E: Executor + ?Sized>(db: &E, phase: &Phase) -> Result<()> {
    let sql = db.dialect().upsert(
        "phases",
        &COLUMNS,
        &["task_id", "phase_id"],
        &COLUMNS[2..],
    );
    db.exec(
        &sql,
        &args![
            &phase.task_id,
            &phase.phase_id,
            &phase.status,
            phase.iterations,
            phase.started_at.as_ref().map(to_db_time),
            phase.completed_at.as_ref().map(to_db_time),
            phase.cost_usd,
            &phase.error_message,
        ],
    )
    .op(|| format!("save phase {}/{}", phase.task_id, phase.phase_id))?;
    Ok(())
}

/// Phases of a task in start order; never-started phases last.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_phases<E: Executor + ?Sized>(db: &E, task_id: &str) -> Result<Vec<Phase>> {
    let sql = format!(
        "SELECT {} FROM phases WHERE task_id = ?
         ORDER BY CASE WHEN started_at IS NULL THEN 1 ELSE 0 END, started_at, phase_id",
        COLUMNS.join(", ")
    );
    db.query(&sql, &args![task_id])
        .op(|| format!("get phases for {task_id}"))?
        .iter()
        .map(phase_from_row)
        .collect()
}

/// # Errors
///
/// Returns an error if the statement fails.
pub fn delete_phase<E: Executor + ?Sized>(db: &E, task_id: &str, phase_id: &str) -> Result<bool> {
    let n = db
        .exec(
            "DELETE FROM phases WHERE task_id = ? AND phase_id = ?",
            &args![task_id, phase_id],
        )
        .op(|| format!("delete phase {task_id}/{phase_id}"))?;
    Ok(n > 0)
}
