//! Proposals and the decisions that resolve them.

use serde::{Deserialize, Serialize};
use crate::id::{DecisionId, ExecutorId, TaskId};
use crate::phase::ProjectPhase;
use crate::Time;

/// A candidate way to execute a task, submitted for arbitration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Executor that proposes it
    pub proposer: ExecutorId,

    /// What the proposal would do
    pub summary: String,

    /// Why the proposer thinks it is right
    #[serde(default)]
    pub reasoning: String,

    /// Risk (0.0 - 1.0, lower is better)
    pub risk: f64,

    /// Complexity (0.0 - 1.0, lower is better)
    pub complexity: f64,

    /// Estimated duration in hours
    pub estimated_hours: f64,
}

impl Proposal {
    /// Create a proposal.
    pub fn new(
        proposer: impl Into<ExecutorId>,
        summary: impl Into<String>,
        risk: f64,
        complexity: f64,
        estimated_hours: f64,
    ) -> Self {
        Self {
            proposer: proposer.into(),
            summary: summary.into(),
            reasoning: String::new(),
            risk,
            complexity,
            estimated_hours,
        }
    }

    /// Attach reasoning.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

/// A proposal with the composite score it received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProposal {
    /// The proposal
    pub proposal: Proposal,
    /// Composite arbitration score
    pub score: f64,
}

/// Immutable record of an arbitration outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier
    pub id: DecisionId,

    /// Task the decision resolves
    pub task_id: TaskId,

    /// Winning proposal
    pub chosen: ScoredProposal,

    /// Every competing proposal with its score, best first
    pub candidates: Vec<ScoredProposal>,

    /// Score difference to the runner-up; `None` when uncontested
    pub margin: Option<f64>,

    /// Phase the decision was made in
    pub phase: ProjectPhase,

    /// Human-readable explanation
    pub reasoning: String,

    /// When the decision was made
    pub timestamp: Time,
}

impl Decision {
    /// Executor whose proposal won.
    pub fn winner(&self) -> &ExecutorId {
        &self.chosen.proposal.proposer
    }
}
