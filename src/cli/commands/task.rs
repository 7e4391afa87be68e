//! Task commands.
//!
//! - `flowstore task save <id>` - Create or update a task
//! - `flowstore task show <id>` - Show a task with its phases
//! - `flowstore task list` - List tasks
//! - `flowstore task delete <id>` - Delete a task and everything under it

use crate::cli::{TaskCommands, TaskSaveArgs};
use crate::error::{Error, Result};
use crate::model::{Phase, Task, TaskStatus};
use crate::storage::phases::get_phases;
use crate::storage::tasks::{TaskFilter, delete_task, get_task, list_tasks, require_task, save_task};
use crate::storage::{Context, Database};
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct TaskWithPhases {
    #[serde(flatten)]
    task: Task,
    phases: Vec<Phase>,
}

/// Execute a task command.
///
/// # Errors
///
/// Returns storage errors, `NotFound`, or `InvalidArgument` for bad input.
pub fn execute(db: &Database, command: &TaskCommands, json: bool) -> Result<()> {
    match command {
        TaskCommands::Save(args) => execute_save(db, args, json),
        TaskCommands::Show { id } => execute_show(db, id, json),
        TaskCommands::List {
            status,
            initiative,
            queue,
            limit,
            offset,
        } => {
            let filter = TaskFilter {
                status: status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
                initiative_id: initiative.clone(),
                queue: queue.clone(),
                limit: *limit,
                offset: *offset,
            };
            execute_list(db, &filter, json)
        }
        TaskCommands::Delete { id } => execute_delete(db, id, json),
    }
}

/// Merge the given fields into `existing`, or build a new task.
///
/// Entering `running` stamps `started_at`; entering a terminal status stamps
/// `completed_at`. Existing stamps are kept.
fn apply_save(existing: Option<Task>, args: &TaskSaveArgs) -> Result<Task> {
    let mut task = match existing {
        Some(task) => task,
        None => {
            let title = args
                .title
                .as_deref()
                .ok_or_else(|| Error::InvalidArgument(format!("task {} does not exist; --title is required", args.id)))?;
            Task::new(&args.id, title)
        }
    };

    let set = |field: &mut String, value: &Option<String>| {
        if let Some(v) = value {
            field.clone_from(v);
        }
    };
    set(&mut task.title, &args.title);
    set(&mut task.description, &args.description);
    set(&mut task.weight, &args.weight);
    set(&mut task.workflow_id, &args.workflow);
    set(&mut task.current_phase, &args.phase);
    set(&mut task.initiative_id, &args.initiative);
    set(&mut task.queue, &args.queue);
    set(&mut task.priority, &args.priority);
    set(&mut task.category, &args.category);
    set(&mut task.branch, &args.branch);
    set(&mut task.target_branch, &args.target_branch);

    let now = Utc::now();
    if let Some(status) = &args.status {
        task.status = status.parse()?;
        if task.status == TaskStatus::Running && task.started_at.is_none() {
            task.started_at = Some(now);
        }
        if task.status.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    }
    task.updated_at = now;
    Ok(task)
}

fn execute_save(db: &Database, args: &TaskSaveArgs, json: bool) -> Result<()> {
    let (task, created) = db.run_in_tx(&Context::background(), |tx| {
        let existing = get_task(tx, &args.id)?;
        let created = existing.is_none();
        let task = apply_save(existing, args)?;
        save_task(tx, &task)?;
        Ok((task, created))
    })?;

    if json {
        return super::print_json(&task);
    }
    let verb = if created { "Created" } else { "Updated" };
    println!("{verb} task {} [{}]", task.id.bold(), task.status);
    println!("  {}", task.title);
    Ok(())
}

fn execute_show(db: &Database, id: &str, json: bool) -> Result<()> {
    let task = require_task(db, id)?;
    let phases = get_phases(db, id)?;

    if json {
        return super::print_json(&TaskWithPhases { task, phases });
    }

    println!("{} {}", task.id.bold(), task.title);
    println!("  Status:     {}", status_colored(task.status));
    if !task.current_phase.is_empty() {
        println!("  Phase:      {}", task.current_phase);
    }
    if !task.workflow_id.is_empty() {
        println!("  Workflow:   {}", task.workflow_id);
    }
    if !task.initiative_id.is_empty() {
        println!("  Initiative: {}", task.initiative_id);
    }
    println!("  Queue:      {} ({} priority)", task.queue, task.priority);
    println!("  Cost:       ${:.4}", task.total_cost_usd);
    println!("  Created:    {}", task.created_at.to_rfc3339());
    if let Some(done) = task.completed_at {
        println!("  Completed:  {}", done.to_rfc3339());
    }
    if !task.description.is_empty() {
        println!("\n{}", task.description);
    }

    if !phases.is_empty() {
        println!("\n{}", "Phases".cyan().bold());
        for phase in &phases {
            let cost = if phase.cost_usd > 0.0 { format!(" ${:.4}", phase.cost_usd) } else { String::new() };
            println!(
                "  {:<12} {:<10} {}{}",
                phase.phase_id,
                phase.status,
                format!("x{}", phase.iterations).dimmed(),
                cost.dimmed()
            );
            if !phase.error_message.is_empty() {
                println!("    {}", phase.error_message.red());
            }
        }
    }
    Ok(())
}

fn execute_list(db: &Database, filter: &TaskFilter, json: bool) -> Result<()> {
    let page = list_tasks(db, filter)?;

    if json {
        return super::print_json(&page);
    }
    if page.tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    println!("Tasks ({} of {}):\n", page.tasks.len(), page.total);
    for task in &page.tasks {
        println!(
            "  {:<12} {:<22} {}",
            task.id.bold(),
            status_colored(task.status),
            super::truncate(&task.title, 60)
        );
    }
    Ok(())
}

fn execute_delete(db: &Database, id: &str, json: bool) -> Result<()> {
    delete_task(db, &Context::background(), id)?;

    if json {
        return super::print_json(&serde_json::json!({ "deleted": id }));
    }
    println!("Deleted task {id}");
    Ok(())
}

fn status_colored(status: TaskStatus) -> colored::ColoredString {
    let s = status.as_str();
    match status {
        TaskStatus::Completed | TaskStatus::Resolved => s.green(),
        TaskStatus::Failed => s.red(),
        TaskStatus::Blocked | TaskStatus::Paused => s.yellow(),
        TaskStatus::Running | TaskStatus::Finalizing => s.cyan(),
        TaskStatus::Created | TaskStatus::Planned => s.normal(),
    }
}
