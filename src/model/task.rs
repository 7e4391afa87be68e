//! Task and per-task phase records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Created,
    Planned,
    Running,
    Paused,
    Blocked,
    Finalizing,
    Completed,
    Failed,
    Resolved,
}

impl TaskStatus {
    pub const ALL: [Self; 9] = [
        Self::Created,
        Self::Planned,
        Self::Running,
        Self::Paused,
        Self::Blocked,
        Self::Finalizing,
        Self::Completed,
        Self::Failed,
        Self::Resolved,
    ];

    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Blocked => "blocked",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Resolved => "resolved",
        }
    }

    /// No further execution is expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Resolved)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown task status '{s}'")))
    }
}

/// A unit of orchestrated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-assigned key (e.g., "TASK-001")
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Size class: trivial, small, medium, large
    pub weight: String,
    #[serde(default)]
    pub workflow_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub current_phase: String,
    #[serde(default)]
    pub branch: String,
    /// Override target branch for the eventual PR
    #[serde(default)]
    pub target_branch: String,
    /// "active" or "backlog"
    pub queue: String,
    pub priority: String,
    pub category: String,
    /// Initiative membership; empty when standalone
    #[serde(default)]
    pub initiative_id: String,
    pub total_cost_usd: f64,
    /// Free-form JSON object text
    #[serde(default)]
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in `created` status with default classification.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            weight: "medium".to_string(),
            workflow_id: String::new(),
            status: TaskStatus::Created,
            current_phase: String::new(),
            branch: String::new(),
            target_branch: String::new(),
            queue: "active".to_string(),
            priority: "normal".to_string(),
            category: "feature".to_string(),
            initiative_id: String::new(),
            total_cost_usd: 0.0,
            metadata: String::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_initiative(mut self, initiative_id: impl Into<String>) -> Self {
        self.initiative_id = initiative_id.into();
        self
    }
}

/// Execution state of one phase of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub task_id: String,
    /// Phase template name (e.g., "spec", "implement", "review")
    pub phase_id: String,
    /// pending, running, completed, failed, skipped
    pub status: String,
    pub iterations: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cost_usd: f64,
    #[serde(default)]
    pub error_message: String,
}

impl Phase {
    #[must_use]
    pub fn new(task_id: impl Into<String>, phase_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            phase_id: phase_id.into(),
            status: "pending".to_string(),
            iterations: 0,
            started_at: None,
            completed_at: None,
            cost_usd: 0.0,
            error_message: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("RUNNING".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
        assert!("exploded".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("TASK-001", "Add login");
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.queue, "active");
        assert!(task.initiative_id.is_empty());
        assert!(!task.status.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }
}
