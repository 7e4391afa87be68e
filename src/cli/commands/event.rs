//! Event log commands.

use crate::cli::{EventAppendArgs, EventCommands, EventFilterArgs};
use crate::error::{Error, Result};
use crate::storage::events::{
    EventLog, QueryEventsOptions, count_events, format_event_timestamp, query_events,
    query_events_with_titles, save_event,
};
use crate::storage::Database;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct AppendOutput<'a> {
    #[serde(flatten)]
    event: &'a EventLog,
    duplicate: bool,
}

/// Execute an event command.
///
/// # Errors
///
/// Returns `InvalidArgument` for a malformed payload, or the storage error.
pub fn execute(db: &Database, command: &EventCommands, json: bool) -> Result<()> {
    match command {
        EventCommands::Append(args) => execute_append(db, args, json),
        EventCommands::List {
            filter,
            limit,
            offset,
            titles,
        } => {
            let mut opts = query_options(filter);
            opts.limit = *limit;
            opts.offset = *offset;
            execute_list(db, &opts, *titles, json)
        }
        EventCommands::Count { filter } => {
            let total = count_events(db, &query_options(filter))?;
            if json {
                super::print_json(&serde_json::json!({ "count": total }))
            } else {
                println!("{total}");
                Ok(())
            }
        }
    }
}

fn query_options(filter: &EventFilterArgs) -> QueryEventsOptions {
    QueryEventsOptions {
        task_id: filter.task.clone(),
        initiative_id: filter.initiative.clone(),
        since: filter.since,
        until: filter.until,
        event_types: filter.types.clone(),
        ..QueryEventsOptions::default()
    }
}

fn build_event(args: &EventAppendArgs) -> Result<EventLog> {
    let mut event = EventLog::new(&args.task_id, &args.event_type, &args.source);
    if let Some(phase) = &args.phase {
        event = event.with_phase(phase);
    }
    if let Some(iteration) = args.iteration {
        event = event.with_iteration(iteration);
    }
    if let Some(ms) = args.duration_ms {
        event = event.with_duration_ms(ms);
    }
    if let Some(at) = args.at {
        event = event.at(at);
    }
    if let Some(raw) = &args.data {
        let payload: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidArgument(format!("--data is not valid JSON: {e}")))?;
        event = event.with_data(&payload)?;
    }
    Ok(event)
}

fn execute_append(db: &Database, args: &EventAppendArgs, json: bool) -> Result<()> {
    let mut event = build_event(args)?;
    save_event(db, &mut event)?;
    let duplicate = event.id == 0;

    if json {
        return super::print_json(&AppendOutput {
            event: &event,
            duplicate,
        });
    }
    if duplicate {
        println!("{} duplicate event ignored", "=".dimmed());
    } else {
        println!("Appended event #{} ({})", event.id, event.event_type.bold());
    }
    Ok(())
}

fn execute_list(db: &Database, opts: &QueryEventsOptions, titles: bool, json: bool) -> Result<()> {
    if titles {
        let events = query_events_with_titles(db, opts)?;
        if json {
            return super::print_json(&events);
        }
        for e in &events {
            print_event(&e.event, Some(&e.task_title));
        }
        return Ok(());
    }

    let events = query_events(db, opts)?;
    if json {
        return super::print_json(&events);
    }
    if events.is_empty() {
        println!("No events found.");
    }
    for e in &events {
        print_event(e, None);
    }
    Ok(())
}

fn print_event(e: &EventLog, title: Option<&str>) {
    let when = format_event_timestamp(&e.created_at);
    let phase = e.phase.as_deref().map(|p| format!("/{p}")).unwrap_or_default();
    let title = title.filter(|t| !t.is_empty()).map(|t| format!(" {t}")).unwrap_or_default();
    let data = e
        .data
        .as_ref()
        .map(|d| format!(" {}", super::truncate(&d.to_string(), 80)))
        .unwrap_or_default();
    println!(
        "{} {}{}{} {}{}",
        when.dimmed(),
        e.task_id.bold(),
        phase,
        title,
        e.event_type.cyan(),
        data.dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_time;

    #[test]
    fn test_build_event() {
        let args = EventAppendArgs {
            task_id: "TASK-001".into(),
            event_type: "phase".into(),
            phase: Some("implement".into()),
            source: "executor".into(),
            data: Some(r#"{"status":"started"}"#.into()),
            at: Some(parse_time("2024-01-15T12:00:00Z").unwrap()),
            ..EventAppendArgs::default()
        };
        let event = build_event(&args).unwrap();
        assert_eq!(event.phase.as_deref(), Some("implement"));
        assert_eq!(event.data.unwrap()["status"], "started");
        assert_eq!(format_event_timestamp(&event.created_at), "2024-01-15 12:00:00.000000000");
    }

    #[test]
    fn test_bad_payload_is_invalid_argument() {
        let args = EventAppendArgs {
            task_id: "TASK-001".into(),
            event_type: "phase".into(),
            data: Some("{not json".into()),
            ..EventAppendArgs::default()
        };
        assert!(matches!(build_event(&args).unwrap_err(), Error::InvalidArgument(_)));
    }

    #[test]
    fn test_filter_maps_to_options() {
        let filter = EventFilterArgs {
            task: Some("TASK-001".into()),
            types: vec!["error".into()],
            ..EventFilterArgs::default()
        };
        let opts = query_options(&filter);
        assert_eq!(opts.task_id.as_deref(), Some("TASK-001"));
        assert_eq!(opts.event_types, ["error"]);
        assert_eq!(opts.limit, 0);
    }
}
