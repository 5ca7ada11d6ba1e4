//! Executor routing and arbitration.
//!
//! - [`ModelScorer`] picks the best executor for a task by weighted
//!   multi-criteria scoring and historical performance.
//! - [`ToolRouter`] decides when an external tool beats the AI baseline.
//! - [`Arbitrator`] resolves competing proposals into audited decisions.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod scorer;
pub mod tool_router;
pub mod arbitrator;

pub use config::{
    load_config, parse_config, ArbitrationConfig, ArbitrationWeights, RoutingConfig,
    ScoringPenalties, ScoringWeights, ToolRoutingConfig, ToolWeights,
};
pub use error::{Result, RoutingError};
pub use scorer::{ModelScorer, ScoreBreakdown, Selection, TaskRequirements};
pub use tool_router::{infer_task_type, ToolDecision, ToolRouter};
pub use arbitrator::Arbitrator;
