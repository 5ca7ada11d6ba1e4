//! Execution error types.

use archon_routing::RoutingError;
use archon_storage::StorageError;

use crate::graph::GraphError;
use crate::status::StatusError;

/// Errors that abort an engine operation.
///
/// Failures of individual tasks are not errors; they are recorded as
/// `Failed` statuses and reported in the run report.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Graph construction or extension failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A status transition was rejected
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Routing configuration was rejected
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The store failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;
