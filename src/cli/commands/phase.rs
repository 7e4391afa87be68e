//! Phase commands.

use crate::cli::{PhaseCommands, PhaseSaveArgs};
use crate::error::Result;
use crate::model::Phase;
use crate::storage::phases::{get_phases, save_phase};
use crate::storage::tasks::{require_task, save_task};
use crate::storage::{Context, Database};
use chrono::Utc;
use colored::Colorize;

/// Execute a phase command.
///
/// # Errors
///
/// Returns `NotFound` for an unknown task, or the storage error.
pub fn execute(db: &Database, command: &PhaseCommands, json: bool) -> Result<()> {
    match command {
        PhaseCommands::Save(args) => execute_save(db, args, json),
        PhaseCommands::List { task_id } => execute_list(db, task_id, json),
    }
}

fn apply(mut phase: Phase, args: &PhaseSaveArgs) -> Phase {
    let now = Utc::now();
    if let Some(status) = &args.status {
        phase.status.clone_from(status);
        if phase.started_at.is_none() && status != "pending" {
            phase.started_at = Some(now);
        }
        if matches!(status.as_str(), "completed" | "failed" | "skipped") {
            phase.completed_at = Some(now);
        }
    }
    if let Some(n) = args.iterations {
        phase.iterations = n;
    }
    if let Some(cost) = args.cost {
        phase.cost_usd = cost;
    }
    if let Some(err) = &args.error {
        phase.error_message.clone_from(err);
    }
    phase
}

/// Upsert the phase and roll its cost up into the task total.
fn execute_save(db: &Database, args: &PhaseSaveArgs, json: bool) -> Result<()> {
    let phase = db.run_in_tx(&Context::background(), |tx| {
        let mut task = require_task(tx, &args.task_id)?;
        let mut phases = get_phases(tx, &args.task_id)?;

        let current = phases
            .iter()
            .position(|p| p.phase_id == args.phase_id)
            .map_or_else(|| Phase::new(&args.task_id, &args.phase_id), |i| phases.swap_remove(i));
        let phase = apply(current, args);
        save_phase(tx, &phase)?;

        task.total_cost_usd = phases.iter().map(|p| p.cost_usd).sum::<f64>() + phase.cost_usd;
        task.current_phase.clone_from(&phase.phase_id);
        task.updated_at = Utc::now();
        save_task(tx, &task)?;
        Ok(phase)
    })?;

    if json {
        return super::print_json(&phase);
    }
    println!(
        "Saved phase {}/{} [{}]",
        phase.task_id,
        phase.phase_id.bold(),
        phase.status
    );
    Ok(())
}

fn execute_list(db: &Database, task_id: &str, json: bool) -> Result<()> {
    require_task(db, task_id)?;
    let phases = get_phases(db, task_id)?;

    if json {
        return super::print_json(&phases);
    }
    if phases.is_empty() {
        println!("No phases recorded for {task_id}.");
        return Ok(());
    }
    for phase in &phases {
        let started = phase
            .started_at
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "  {:<12} {:<10} {:<17} x{:<3} ${:.4}",
            phase.phase_id.bold(),
            phase.status,
            started.dimmed(),
            phase.iterations,
            phase.cost_usd
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use crate::storage::tasks::get_task;

    fn args(phase: &str, cost: f64) -> PhaseSaveArgs {
        PhaseSaveArgs {
            task_id: "TASK-001".into(),
            phase_id: phase.into(),
            status: Some("completed".into()),
            cost: Some(cost),
            ..PhaseSaveArgs::default()
        }
    }

    #[test]
    fn test_save_rolls_cost_into_task() {
        let db = Database::open_in_memory().unwrap();
        save_task(&db, &Task::new("TASK-001", "t")).unwrap();

        execute_save(&db, &args("spec", 0.25), true).unwrap();
        execute_save(&db, &args("implement", 1.0), true).unwrap();
        // Re-saving replaces, not adds.
        execute_save(&db, &args("implement", 1.5), true).unwrap();

        let task = get_task(&db, "TASK-001").unwrap().unwrap();
        assert!((task.total_cost_usd - 1.75).abs() < 1e-9);
        assert_eq!(task.current_phase, "implement");

        let phases = get_phases(&db, "TASK-001").unwrap();
        assert_eq!(phases.len(), 2);
        assert!(phases.iter().all(|p| p.completed_at.is_some()));
    }

    #[test]
    fn test_unknown_task_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let err = execute_save(&db, &args("spec", 1.0), true).unwrap_err();
        assert!(err.is_not_found());
        assert!(get_phases(&db, "TASK-001").unwrap().is_empty());
    }
}
