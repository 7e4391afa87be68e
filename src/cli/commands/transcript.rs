//! Transcript commands.

use crate::cli::{TranscriptAddArgs, TranscriptCommands};
use crate::error::Result;
use crate::storage::tasks::require_task;
use crate::storage::transcripts::{
    Direction, PaginationOptions, Transcript, add_transcript, get_phase_summary,
    get_phase_token_usage, get_task_token_usage, get_transcripts_paginated, search_transcripts,
};
use crate::storage::Database;
use colored::Colorize;

/// Execute a transcript command.
///
/// # Errors
///
/// Returns `InvalidArgument` for a malformed cursor, `NotFound` for an
/// unknown task, or the storage error.
pub fn execute(db: &Database, command: &TranscriptCommands, json: bool) -> Result<()> {
    match command {
        TranscriptCommands::Add(args) => execute_add(db, args, json),
        TranscriptCommands::List {
            task_id,
            phase,
            limit,
            cursor,
            desc,
        } => {
            let opts = PaginationOptions {
                phase: phase.clone(),
                limit: *limit,
                cursor: cursor.clone(),
                direction: if *desc { Direction::Desc } else { Direction::Asc },
            };
            execute_list(db, task_id, &opts, json)
        }
        TranscriptCommands::Search { term } => execute_search(db, term, json),
        TranscriptCommands::Phases { task_id } => {
            let summary = get_phase_summary(db, task_id)?;
            if json {
                return super::print_json(&summary);
            }
            for s in &summary {
                println!("  {:<12} {}", s.phase.bold(), s.transcript_count);
            }
            Ok(())
        }
        TranscriptCommands::Usage { task_id, phase } => {
            let usage = match phase {
                Some(phase) => get_phase_token_usage(db, task_id, phase)?,
                None => get_task_token_usage(db, task_id)?,
            };
            if json {
                return super::print_json(&usage);
            }
            println!("{} {}", "Token usage".cyan().bold(), usage.task_id);
            println!("  Messages:       {}", usage.message_count);
            println!("  Input:          {}", usage.total_input);
            println!("  Output:         {}", usage.total_output);
            println!("  Cache creation: {}", usage.total_cache_creation);
            println!("  Cache read:     {}", usage.total_cache_read);
            Ok(())
        }
    }
}

fn build_transcript(args: &TranscriptAddArgs) -> Transcript {
    let mut t = Transcript::new(&args.task_id, &args.phase, &args.message_type, &args.content);
    t.role = args.role.clone().unwrap_or_else(|| args.message_type.clone());
    if let Some(session) = &args.session {
        t.session_id.clone_from(session);
    }
    if let Some(model) = &args.model {
        t.model.clone_from(model);
    }
    t.input_tokens = args.input_tokens;
    t.output_tokens = args.output_tokens;
    t
}

fn execute_add(db: &Database, args: &TranscriptAddArgs, json: bool) -> Result<()> {
    require_task(db, &args.task_id)?;
    let mut t = build_transcript(args);
    add_transcript(db, &mut t)?;

    if json {
        return super::print_json(&t);
    }
    println!("Added transcript #{} to {}/{}", t.id, t.task_id, t.phase);
    Ok(())
}

fn execute_list(db: &Database, task_id: &str, opts: &PaginationOptions, json: bool) -> Result<()> {
    let page = get_transcripts_paginated(db, task_id, opts)?;

    if json {
        return super::print_json(&page);
    }
    if page.transcripts.is_empty() {
        println!("No transcripts.");
    }
    for t in &page.transcripts {
        println!(
            "{} {:<10} {:<9} {}",
            format!("#{}", t.id).dimmed(),
            t.phase.bold(),
            t.message_type.cyan(),
            super::truncate(&t.content, 90)
        );
    }
    println!(
        "\n{} of {} messages",
        page.transcripts.len(),
        page.total_count
    );
    if let Some(next) = &page.next_cursor {
        println!("  next: --cursor {next}");
    }
    if let Some(prev) = &page.prev_cursor {
        println!("  prev: --cursor {prev}");
    }
    Ok(())
}

fn execute_search(db: &Database, term: &str, json: bool) -> Result<()> {
    let matches = search_transcripts(db, term)?;

    if json {
        return super::print_json(&matches);
    }
    if matches.is_empty() {
        println!("No matches for '{term}'.");
    }
    for m in &matches {
        let snippet = m.snippet.replace("<mark>", "").replace("</mark>", "");
        println!(
            "{} {}/{} {}",
            format!("#{}", m.id).dimmed(),
            m.task_id.bold(),
            m.phase,
            super::truncate(&snippet, 100)
        );
    }
    Ok(())
}
