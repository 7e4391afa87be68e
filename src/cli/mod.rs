//! CLI definitions using clap.

use crate::config::{DatabaseConfig, ENV_DATABASE_URL, ENV_DB, ENV_DIALECT, Overrides};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// flowstore - task orchestration storage over SQLite or Postgres
#[derive(Parser, Debug)]
#[command(name = "flowstore", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend: sqlite or postgres
    #[arg(long, global = true, env = ENV_DIALECT)]
    pub dialect: Option<String>,

    /// SQLite database file (default: <data dir>/flowstore.db)
    #[arg(long, global = true, env = ENV_DB)]
    pub db: Option<PathBuf>,

    /// Postgres connection string
    #[arg(long, global = true, env = ENV_DATABASE_URL, hide_env_values = true)]
    pub dsn: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Database settings from flags, then environment, then defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown dialect or bad environment value.
    pub fn database_config(&self) -> Result<DatabaseConfig> {
        DatabaseConfig::resolve(&Overrides {
            dialect: self.dialect.as_deref(),
            db: self.db.as_deref(),
            dsn: self.dsn.as_deref(),
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending schema migrations and show the schema version
    Migrate,

    /// Task records
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Per-task phase progress
    Phase {
        #[command(subcommand)]
        command: PhaseCommands,
    },

    /// Task event log
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },

    /// Conversation transcripts
    Transcript {
        #[command(subcommand)]
        command: TranscriptCommands,
    },

    /// Status counts, daily cost and initiative totals
    Dashboard {
        /// Days of cost history to include
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Maximum initiatives to list
        #[arg(long, default_value_t = 10)]
        initiatives: u32,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

impl Commands {
    /// Whether the command needs an open database.
    #[must_use]
    pub fn needs_database(&self) -> bool {
        !matches!(self, Self::Completions { .. } | Self::Version)
    }
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Task Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task or update the given fields of an existing one
    Save(TaskSaveArgs),

    /// Show a task with its phases
    Show {
        /// Task ID
        id: String,
    },

    /// List tasks, newest first
    List {
        /// Filter by status
        #[arg(long, short)]
        status: Option<String>,

        /// Filter by initiative
        #[arg(long)]
        initiative: Option<String>,

        /// Filter by queue
        #[arg(long)]
        queue: Option<String>,

        /// Maximum tasks to return (0 = all)
        #[arg(long, short = 'n', default_value_t = 50)]
        limit: u32,

        /// Tasks to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Delete a task with its phases, transcripts and events
    Delete {
        /// Task ID
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct TaskSaveArgs {
    /// Task ID
    pub id: String,

    /// Title (required for new tasks)
    #[arg(long, short)]
    pub title: Option<String>,

    #[arg(long, short)]
    pub description: Option<String>,

    /// Status (created, planned, running, paused, blocked, finalizing, completed, failed, resolved)
    #[arg(long, short)]
    pub status: Option<String>,

    #[arg(long)]
    pub weight: Option<String>,

    #[arg(long)]
    pub workflow: Option<String>,

    #[arg(long)]
    pub phase: Option<String>,

    #[arg(long)]
    pub initiative: Option<String>,

    #[arg(long)]
    pub queue: Option<String>,

    #[arg(long, short)]
    pub priority: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub target_branch: Option<String>,
}

// ============================================================================
// Phase Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum PhaseCommands {
    /// Record progress for one phase of a task
    Save(PhaseSaveArgs),

    /// List a task's phases in start order
    List {
        /// Task ID
        task_id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct PhaseSaveArgs {
    /// Task ID
    pub task_id: String,

    /// Phase ID (e.g. spec, implement, review)
    pub phase_id: String,

    /// Phase status
    #[arg(long, short)]
    pub status: Option<String>,

    #[arg(long)]
    pub iterations: Option<i64>,

    /// Cost in USD
    #[arg(long)]
    pub cost: Option<f64>,

    /// Error message for a failed phase
    #[arg(long)]
    pub error: Option<String>,
}

// ============================================================================
// Event Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum EventCommands {
    /// Append an event; an exact duplicate is ignored
    Append(EventAppendArgs),

    /// List events, newest first
    List {
        #[command(flatten)]
        filter: EventFilterArgs,

        /// Maximum events to return (0 = all)
        #[arg(long, short = 'n', default_value_t = 50)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Include task titles
        #[arg(long)]
        titles: bool,
    },

    /// Count events matching the filter
    Count {
        #[command(flatten)]
        filter: EventFilterArgs,
    },
}

#[derive(Args, Debug, Default)]
pub struct EventAppendArgs {
    /// Task ID
    pub task_id: String,

    /// Event type (phase, transcript, activity, heartbeat, tokens, error, complete, state, warning, session_update)
    pub event_type: String,

    #[arg(long)]
    pub phase: Option<String>,

    #[arg(long)]
    pub iteration: Option<i64>,

    /// Emitting component
    #[arg(long, default_value = "cli")]
    pub source: String,

    /// JSON payload
    #[arg(long)]
    pub data: Option<String>,

    #[arg(long)]
    pub duration_ms: Option<i64>,

    /// Event time, RFC 3339 (default: now)
    #[arg(long, value_parser = parse_time)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct EventFilterArgs {
    #[arg(long)]
    pub task: Option<String>,

    #[arg(long)]
    pub initiative: Option<String>,

    /// Only events at or after this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,

    /// Only events at or before this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub until: Option<DateTime<Utc>>,

    /// Event types to include (repeatable)
    #[arg(long = "type", short = 't')]
    pub types: Vec<String>,
}

// ============================================================================
// Transcript Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TranscriptCommands {
    /// Append a message to a task's transcript
    Add(TranscriptAddArgs),

    /// Page through a task's transcript
    List {
        /// Task ID
        task_id: String,

        #[arg(long)]
        phase: Option<String>,

        /// Page size (default 50, max 200)
        #[arg(long, short = 'n', default_value_t = 0)]
        limit: u32,

        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,

        /// Newest first
        #[arg(long)]
        desc: bool,
    },

    /// Full-text search across all transcripts
    Search {
        /// Search term
        term: String,
    },

    /// Message counts per phase
    Phases {
        /// Task ID
        task_id: String,
    },

    /// Token usage for a task or one of its phases
    Usage {
        /// Task ID
        task_id: String,

        #[arg(long)]
        phase: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct TranscriptAddArgs {
    /// Task ID
    pub task_id: String,

    /// Phase ID
    pub phase: String,

    /// Message content
    pub content: String,

    /// Message type (user, assistant, tool, ...)
    #[arg(long = "type", default_value = "assistant")]
    pub message_type: String,

    #[arg(long)]
    pub role: Option<String>,

    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub input_tokens: i64,

    #[arg(long, default_value_t = 0)]
    pub output_tokens: i64,
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
///
/// # Errors
///
/// Returns `InvalidArgument` if neither form matches.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidArgument(format!("invalid time '{s}': expected RFC 3339 or YYYY-MM-DD")))
}
