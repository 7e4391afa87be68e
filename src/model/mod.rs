//! Data models for flowstore.
//!
//! This module contains the business records persisted by the storage layer:
//! - Task and Phase
//! - Initiative
//! - Workflow and WorkflowPhase
//!
//! Event log entries and transcripts live beside their storage code in
//! [`crate::storage::events`] and [`crate::storage::transcripts`].

pub mod initiative;
pub mod task;
pub mod workflow;

pub use initiative::Initiative;
pub use task::{Phase, Task, TaskStatus};
pub use workflow::{Workflow, WorkflowPhase};
