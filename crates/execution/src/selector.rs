//! Executor selection strategies.

use std::sync::Mutex;

use archon_core::{ExecutorId, ExecutorKind, PerformanceHistory, Task, TaskOutcome};
use archon_routing::{ModelScorer, RoutingConfig, RoutingError, ToolRouter};
use tracing::{debug, info};

use crate::executor::ExecutorRegistry;

/// Strategy for choosing which executor works a task.
pub trait ExecutorSelector: Send + Sync {
    /// Pick an executor registered in `registry`.
    fn select(
        &self,
        task: &Task,
        registry: &ExecutorRegistry,
        history: &PerformanceHistory,
    ) -> Result<ExecutorId, RoutingError>;

    /// Observe the outcome of a run the selector routed.
    fn observe(&self, _executor: &ExecutorId, _outcome: &TaskOutcome) {}
}

/// Tool-first selector: an external tool when it clearly beats the models,
/// otherwise the best-scoring model.
pub struct RoutingSelector {
    scorer: ModelScorer,
    tools: Mutex<ToolRouter>,
}

impl RoutingSelector {
    /// Build from a routing config.
    pub fn new(config: &RoutingConfig) -> Result<Self, RoutingError> {
        Ok(Self {
            scorer: ModelScorer::new(config.scoring, config.penalties)?,
            tools: Mutex::new(ToolRouter::new(config.tools.clone())?),
        })
    }
}

impl ExecutorSelector for RoutingSelector {
    fn select(
        &self,
        task: &Task,
        registry: &ExecutorRegistry,
        history: &PerformanceHistory,
    ) -> Result<ExecutorId, RoutingError> {
        let decision = match self.tools.lock() {
            Ok(router) => router.should_use_tool(task),
            Err(poisoned) => poisoned.into_inner().should_use_tool(task),
        };

        if let Some(tool) = decision.tool.filter(|_| decision.use_tool) {
            let id = ExecutorId::from(tool);
            if registry.get(&id).is_some() {
                info!("Task {} routed to tool {}: {}", task.id, id, decision.reasoning);
                return Ok(id);
            }
            debug!("Tool {} preferred for task {} but not registered", id, task.id);
        }

        let models = registry.profiles(ExecutorKind::Model);
        Ok(self.scorer.score_executors(task, &models, history)?.best)
    }

    fn observe(&self, executor: &ExecutorId, outcome: &TaskOutcome) {
        let mut router = match self.tools.lock() {
            Ok(router) => router,
            Err(poisoned) => poisoned.into_inner(),
        };
        // unknown names are model ids and are ignored
        router.record_tool_usage(executor.as_str(), outcome.success, outcome.duration_ms);
    }
}
