//! Initiatives group related tasks toward one goal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initiative {
    /// Caller-assigned key (e.g., "INIT-001")
    pub id: String,
    pub title: String,
    /// draft, active, completed, archived
    pub status: String,
    #[serde(default)]
    pub vision: String,
    /// Target branch for member tasks
    #[serde(default)]
    pub branch_base: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Initiative {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            status: "draft".to_string(),
            vision: String::new(),
            branch_base: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
