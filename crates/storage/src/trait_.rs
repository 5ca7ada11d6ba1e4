//! Storage trait abstraction.

use async_trait::async_trait;
use archon_core::{Decision, PerformanceHistory, Task, TaskId};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Append-only record already written
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Persistence port for the scheduling core.
///
/// The core never touches a file system or database directly; every backend
/// is plugged in through this trait.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Task state ===

    /// Save a task snapshot (create or update).
    async fn save_task(&mut self, task: &Task) -> Result<()>;

    /// Load a task by ID.
    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>>;

    /// List all stored tasks, ordered by id.
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    // === Decisions (append-only) ===

    /// Append a decision. Writing the same decision id twice is an error.
    async fn append_decision(&mut self, decision: &Decision) -> Result<()>;

    /// List decisions in the order they were made, optionally for one task.
    async fn list_decisions(&self, task: Option<&TaskId>) -> Result<Vec<Decision>>;

    // === Performance history ===

    /// Load historical performance multipliers (empty when none stored).
    async fn load_performance(&self) -> Result<PerformanceHistory>;

    /// Replace the stored performance history.
    async fn save_performance(&mut self, history: &PerformanceHistory) -> Result<()>;
}
