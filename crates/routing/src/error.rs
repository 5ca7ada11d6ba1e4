//! Routing and arbitration errors.

use archon_core::{ExecutorId, TaskId};

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors raised by the scorer, the tool router and the arbitrator.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// A weight set does not sum to 1.0
    #[error("invalid weights for {name}: sum is {sum:.6}, expected 1.0")]
    InvalidWeights {
        /// Which weight set
        name: &'static str,
        /// Actual sum
        sum: f64,
    },

    /// A configured score or constant is out of range
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Setting name
        name: String,
        /// Offending value
        value: f64,
    },

    /// No executor can take the task
    #[error("no candidate executor for task {0}")]
    NoCandidates(TaskId),

    /// Arbitration was requested without proposals
    #[error("no proposals to arbitrate for task {0}")]
    NoProposals(TaskId),

    /// A proposal carries out-of-range scores
    #[error("invalid proposal from {proposer}: {reason}")]
    InvalidProposal {
        /// Proposing executor
        proposer: ExecutorId,
        /// What is wrong with it
        reason: String,
    },

    /// Storage failure while recording or reading history
    #[error("storage error: {0}")]
    Storage(#[from] archon_storage::StorageError),

    /// Config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}
