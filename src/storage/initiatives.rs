//! Initiative records.

use crate::args;
use crate::error::{Result, ResultExt};
use crate::model::Initiative;
use crate::storage::database::Executor;
use crate::storage::dialect::placeholders;
use crate::storage::value::{Row, Value};
use crate::storage::{from_db_time, to_db_time};
use std::collections::HashMap;

const COLUMNS: [&str; 7] = [
    "id",
    "title",
    "status",
    "vision",
    "branch_base",
    "created_at",
    "updated_at",
];

fn initiative_from_row(row: &Row) -> Result<Initiative> {
    Ok(Initiative {
        id: row.get(0)?,
        title: row.get(1)?,
        status: row.get(2)?,
        vision: row.get(3)?,
        branch_base: row.get(4)?,
        created_at: from_db_time(&row.get::<String>(5)?)?,
        updated_at: from_db_time(&row.get::<String>(6)?)?,
    })
}

/// # Errors
///
/// Returns an error if the statement fails.
pub fn save_initiative<E: Executor + ?Sized>(db: &E, init: &Initiative) -> Result<()> {
    let sql = db.dialect().upsert(
        "initiatives",
        &COLUMNS,
        &["id"],
        &["title", "status", "vision", "branch_base", "updated_at"],
    );
    db.exec(
        &sql,
        &args![
            &init.id,
            &init.title,
            &init.status,
            &init.vision,
            &init.branch_base,
            to_db_time(&init.created_at),
            to_db_time(&init.updated_at),
        ],
    )
    .op(|| format!("save initiative {}", init.id))?;
    Ok(())
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_initiative<E: Executor + ?Sized>(db: &E, id: &str) -> Result<Option<Initiative>> {
    let sql = format!("SELECT {} FROM initiatives WHERE id = ?", COLUMNS.join(", "));
    db.query_opt(&sql, &args![id])
        .op(|| format!("get initiative {id}"))?
        .as_ref()
        .map(initiative_from_row)
        .transpose()
}

/// All initiatives, optionally restricted to one status, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_initiatives<E: Executor + ?Sized>(db: &E, status: Option<&str>) -> Result<Vec<Initiative>> {
    let mut sql = format!("SELECT {} FROM initiatives", COLUMNS.join(", "));
    let mut params = Vec::new();
    if let Some(status) = status {
        sql.push_str(" WHERE status = ?");
        params.push(Value::from(status));
    }
    sql.push_str(" ORDER BY created_at DESC, id");

    db.query(&sql, &params)
        .op(|| "list initiatives")?
        .iter()
        .map(initiative_from_row)
        .collect()
}

/// Delete an initiative. Member tasks keep their (now dangling) reference.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn delete_initiative<E: Executor + ?Sized>(db: &E, id: &str) -> Result<bool> {
    let n = db
        .exec("DELETE FROM initiatives WHERE id = ?", &args![id])
        .op(|| format!("delete initiative {id}"))?;
    Ok(n > 0)
}

/// Titles for a set of initiative ids in one round trip.
///
/// Unknown ids are absent from the map.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_initiative_titles<E: Executor + ?Sized>(
    db: &E,
    ids: &[String],
) -> Result<HashMap<String, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT id, title FROM initiatives WHERE id IN ({})",
        placeholders(ids.len())
    );
    let params: Vec<Value> = ids.iter().map(Value::from).collect();

    db.query(&sql, &params)
        .op(|| "get initiative titles")?
        .iter()
        .map(|row| Ok((row.get(0)?, row.get(1)?)))
        .collect()
}
