//! Workflow definitions and their phase slots.

use crate::args;
use crate::error::{Result, ResultExt};
use crate::model::{Workflow, WorkflowPhase};
use crate::storage::database::Executor;
use crate::storage::value::Row;
use crate::storage::{from_db_time, to_db_time};

const WORKFLOW_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "description",
    "workflow_type",
    "default_model",
    "is_builtin",
    "created_at",
    "updated_at",
];

const PHASE_COLUMNS: [&str; 6] = [
    "workflow_id",
    "phase_template_id",
    "sequence",
    "depends_on",
    "max_iterations_override",
    "model_override",
];

fn workflow_from_row(row: &Row) -> Result<Workflow> {
    Ok(Workflow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        workflow_type: row.get(3)?,
        default_model: row.get(4)?,
        is_builtin: row.get(5)?,
        created_at: from_db_time(&row.get::<String>(6)?)?,
        updated_at: from_db_time(&row.get::<String>(7)?)?,
        phases: Vec::new(),
    })
}

fn workflow_phase_from_row(row: &Row) -> Result<WorkflowPhase> {
    Ok(WorkflowPhase {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        phase_template_id: row.get(2)?,
        sequence: row.get(3)?,
        depends_on: row.get(4)?,
        max_iterations_override: row.get(5)?,
        model_override: row.get(6)?,
    })
}

/// Save the workflow row. Phase slots are saved separately.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn save_workflow<E: Executor + ?Sized>(db: &E, wf: &Workflow) -> Result<()> {
    let sql = db.dialect().upsert(
        "workflows",
        &WORKFLOW_COLUMNS,
        &["id"],
        &[
            "name",
            "description",
            "workflow_type",
            "default_model",
            "is_builtin",
            "updated_at",
        ],
    );
    db.exec(
        &sql,
        &args![
            &wf.id,
            &wf.name,
            &wf.description,
            &wf.workflow_type,
            &wf.default_model,
            wf.is_builtin,
            to_db_time(&wf.created_at),
            to_db_time(&wf.updated_at),
        ],
    )
    .op(|| format!("save workflow {}", wf.id))?;
    Ok(())
}

/// Load a workflow with its phases in sequence order.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn get_workflow<E: Executor + ?Sized>(db: &E, id: &str) -> Result<Option<Workflow>> {
    let sql = format!("SELECT {} FROM workflows WHERE id = ?", WORKFLOW_COLUMNS.join(", "));
    let Some(row) = db.query_opt(&sql, &args![id]).op(|| format!("get workflow {id}"))? else {
        return Ok(None);
    };
    let mut wf = workflow_from_row(&row)?;
    wf.phases = get_workflow_phases(db, id)?;
    Ok(Some(wf))
}

/// Workflows without their phases, builtins first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_workflows<E: Executor + ?Sized>(db: &E) -> Result<Vec<Workflow>> {
    let sql = format!(
        "SELECT {} FROM workflows ORDER BY is_builtin DESC, name",
        WORKFLOW_COLUMNS.join(", ")
    );
    db.query(&sql, &[])
        .op(|| "list workflows")?
        .iter()
        .map(workflow_from_row)
        .collect()
}

/// Delete a workflow; its phase slots cascade.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn delete_workflow<E: Executor + ?Sized>(db: &E, id: &str) -> Result<bool> {
    let n = db
        .exec("DELETE FROM workflows WHERE id = ?", &args![id])
        .op(|| format!("delete workflow {id}"))?;
    Ok(n > 0)
}

/// Insert or update a phase slot keyed on (workflow, template), returning its id.
///
/// # Errors
///
/// Returns a constraint error if the workflow does not exist.
pub fn save_workflow_phase<E: Executor + ?Sized>(db: &E, wp: &WorkflowPhase) -> Result<i64> {
    let sql = format!(
        "{} RETURNING id",
        db.dialect().upsert(
            "workflow_phases",
            &PHASE_COLUMNS,
            &["workflow_id", "phase_template_id"],
            &PHASE_COLUMNS[2..],
        )
    );
    db.query_row(
        &sql,
        &args![
            &wp.workflow_id,
            &wp.phase_template_id,
            wp.sequence,
            &wp.depends_on,
            wp.max_iterations_override,
            &wp.model_override,
        ],
    )
    .op(|| format!("save workflow phase {}/{}", wp.workflow_id, wp.phase_template_id))?
    .get(0)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_workflow_phases<E: Executor + ?Sized>(db: &E, workflow_id: &str) -> Result<Vec<WorkflowPhase>> {
    let sql = format!(
        "SELECT id, {} FROM workflow_phases WHERE workflow_id = ? ORDER BY sequence, id",
        PHASE_COLUMNS.join(", ")
    );
    db.query(&sql, &args![workflow_id])
        .op(|| format!("get phases for workflow {workflow_id}"))?
        .iter()
        .map(workflow_phase_from_row)
        .collect()
}
