//! Task records.

use crate::args;
use crate::error::{Error, Result, ResultExt};
use crate::model::{Task, TaskStatus};
use crate::storage::context::Context;
use crate::storage::database::{Database, Executor};
use crate::storage::value::{Row, Value};
use crate::storage::{from_db_time, opt_from_db_time, to_db_time};
use tracing::debug;

const COLUMNS: [&str; 19] = [
    "id",
    "title",
    "description",
    "weight",
    "workflow_id",
    "status",
    "current_phase",
    "branch",
    "target_branch",
    "queue",
    "priority",
    "category",
    "initiative_id",
    "total_cost_usd",
    "metadata",
    "created_at",
    "started_at",
    "completed_at",
    "updated_at",
];

fn select_sql() -> String {
    format!("SELECT {} FROM tasks", COLUMNS.join(", "))
}

fn task_from_row(row: &Row) -> Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        weight: row.get(3)?,
        workflow_id: row.get(4)?,
        status: row.get::<String>(5)?.parse::<TaskStatus>()?,
        current_phase: row.get(6)?,
        branch: row.get(7)?,
        target_branch: row.get(8)?,
        queue: row.get(9)?,
        priority: row.get(10)?,
        category: row.get(11)?,
        initiative_id: row.get(12)?,
        total_cost_usd: row.get(13)?,
        metadata: row.get(14)?,
        created_at: from_db_time(&row.get::<String>(15)?)?,
        started_at: opt_from_db_time(row.get(16)?)?,
        completed_at: opt_from_db_time(row.get(17)?)?,
        updated_at: from_db_time(&row.get::<String>(18)?)?,
    })
}

/// Insert a task, or overwrite every column but `created_at` if it exists.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn save_task<E: Executor + ?Sized>(db: &E, task: &Task) -> Result<()> {
    let update: Vec<&str> = COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != "id" && *c != "created_at")
        .collect();
    let sql = db.dialect().upsert("tasks", &COLUMNS, &["id"], &update);

    db.exec(
        &sql,
        &args![
            &task.id,
            &task.title,
            &task.description,
            &task.weight,
            &task.workflow_id,
            task.status.as_str(),
            &task.current_phase,
            &task.branch,
            &task.target_branch,
            &task.queue,
            &task.priority,
            &task.category,
            &task.initiative_id,
            task.total_cost_usd,
            &task.metadata,
            to_db_time(&task.created_at),
            task.started_at.as_ref().map(to_db_time),
            task.completed_at.as_ref().map(to_db_time),
            to_db_time(&task.updated_at),
        ],
    )
    .op(|| format!("save task {}", task.id))?;
    Ok(())
}

/// # Errors
///
/// Returns an error if the query fails or a stored row is malformed.
pub fn get_task<E: Executor + ?Sized>(db: &E, id: &str) -> Result<Option<Task>> {
    db.query_opt(&format!("{} WHERE id = ?", select_sql()), &args![id])
        .op(|| format!("get task {id}"))?
        .as_ref()
        .map(task_from_row)
        .transpose()
}

/// Like [`get_task`], but a missing task is `NotFound`.
///
/// # Errors
///
/// Returns `NotFound` if no task has this id.
pub fn require_task<E: Executor + ?Sized>(db: &E, id: &str) -> Result<Task> {
    get_task(db, id)?.ok_or_else(|| Error::NotFound {
        entity: "task",
        id: id.to_string(),
    })
}

/// Conjunctive task filters. `limit == 0` returns every match.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub initiative_id: Option<String>,
    pub queue: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// One page of tasks plus the unpaginated match count.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: i64,
}

/// List tasks newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_tasks<E: Executor + ?Sized>(db: &E, filter: &TaskFilter) -> Result<TaskPage> {
    let mut conditions = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("status = ?");
        params.push(status.as_str().into());
    }
    if let Some(initiative) = &filter.initiative_id {
        conditions.push("initiative_id = ?");
        params.push(initiative.into());
    }
    if let Some(queue) = &filter.queue {
        conditions.push("queue = ?");
        params.push(queue.into());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let total: i64 = db
        .query_row(&format!("SELECT COUNT(*) FROM tasks{where_clause}"), &params)
        .op(|| "count tasks")?
        .get(0)?;

    let mut sql = format!("{}{where_clause} ORDER BY created_at DESC, id DESC", select_sql());
    if filter.limit > 0 {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(filter.limit.into());
        params.push(filter.offset.into());
    }

    let tasks = db
        .query(&sql, &params)
        .op(|| "list tasks")?
        .iter()
        .map(task_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(TaskPage { tasks, total })
}

/// Delete a task and everything it owns in one transaction.
///
/// # Errors
///
/// Returns `NotFound` if no task has this id, or the first failing statement.
pub fn delete_task(db: &Database, ctx: &Context, id: &str) -> Result<()> {
    db.run_in_tx(ctx, |tx| {
        // Children first, so the outcome does not depend on FK enforcement.
        for table in ["event_log", "transcripts", "phases"] {
            tx.exec(&format!("DELETE FROM {table} WHERE task_id = ?"), &args![id])?;
        }
        let deleted = tx.exec("DELETE FROM tasks WHERE id = ?", &args![id])?;
        if deleted == 0 {
            return Err(Error::NotFound {
                entity: "task",
                id: id.to_string(),
            });
        }
        Ok(())
    })
    .op(|| format!("delete task {id}"))?;

    debug!(task_id = id, "Task deleted");
    Ok(())
}

/// Whether a task with this id exists.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn task_exists<E: Executor + ?Sized>(db: &E, id: &str) -> Result<bool> {
    Ok(db
        .query_opt("SELECT 1 FROM tasks WHERE id = ?", &args![id])?
        .is_some())
}
