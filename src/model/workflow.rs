//! Workflow definitions: an ordered list of phase templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// task, branch, standalone
    pub workflow_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_model: String,
    pub is_builtin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Loaded relation, not stored on the workflow row.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<WorkflowPhase>,
}

impl Workflow {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            workflow_type: "task".to_string(),
            default_model: String::new(),
            is_builtin: false,
            created_at: now,
            updated_at: now,
            phases: Vec::new(),
        }
    }
}

/// One phase slot within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPhase {
    /// Assigned by the database; 0 before the first save
    pub id: i64,
    pub workflow_id: String,
    pub phase_template_id: String,
    pub sequence: i64,
    /// JSON array of phase template ids
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub depends_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations_override: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_override: String,
}

impl WorkflowPhase {
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, phase_template_id: impl Into<String>, sequence: i64) -> Self {
        Self {
            id: 0,
            workflow_id: workflow_id.into(),
            phase_template_id: phase_template_id.into(),
            sequence,
            depends_on: String::new(),
            max_iterations_override: None,
            model_override: String::new(),
        }
    }
}
