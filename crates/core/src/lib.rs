//! Archon core data models.
//!
//! This crate defines the data structures shared by the task graph,
//! the scheduler, executor routing and arbitration.

#![warn(missing_docs)]

// Core identities
mod id;

// Task execution
mod task;
mod phase;

// Routing and arbitration
mod executor;
mod decision;
mod performance;

// Re-exports
pub use id::*;

pub use task::{Task, TaskCategory, TaskContext, TaskOutcome, TaskStatus, DEFAULT_QUALITY_THRESHOLD};
pub use phase::{PhaseContext, ProjectPhase};
pub use executor::{ExecutorKind, ExecutorProfile, ExternalTool, ToolUsage};
pub use decision::{Decision, Proposal, ScoredProposal};
pub use performance::{PerformanceEntry, PerformanceHistory, PERFORMANCE_ALPHA};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
