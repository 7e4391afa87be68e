//! flowstore - persistence for task orchestration
//!
//! One storage core over two SQL backends (embedded SQLite and networked
//! Postgres): a transaction coordinator, an idempotent event log,
//! cursor-paginated transcripts with full-text search, and dashboard
//! aggregates.
//!
//! # Architecture
//!
//! - [`storage`] - Drivers, transactions, migrations and record access
//! - [`model`] - Task, phase, initiative and workflow records
//! - [`config`] - Backend selection and paths
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;

pub use error::{Error, Result};
