//! Executor boundary - models and tools the engine hands tasks to.

use std::collections::BTreeMap;
use std::sync::Arc;

use archon_core::{ExecutorId, ExecutorKind, ExecutorProfile, Proposal, Task, TaskCategory, TaskOutcome};
use async_trait::async_trait;

/// Something that can work a task: an AI model client or a tool wrapper.
///
/// Executors report outcomes only. Whatever they produce stays on their
/// side of this boundary; the engine never receives or writes artifacts.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Declared capabilities used for routing.
    fn profile(&self) -> &ExecutorProfile;

    /// Work the task.
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskOutcome>;

    /// Offer an approach for a task under deliberation.
    ///
    /// Executors that do not take part in deliberation keep the default.
    async fn propose(&self, _task: &Task) -> Option<Proposal> {
        None
    }
}

/// Registered executors, keyed by id.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: BTreeMap<ExecutorId, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing one with the same id.
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(executor.profile().id.clone(), executor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(executor);
        self
    }

    /// Look up an executor.
    pub fn get(&self, id: &ExecutorId) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(id).cloned()
    }

    /// Profiles of every executor of `kind`, ascending by id.
    pub fn profiles(&self, kind: ExecutorKind) -> Vec<ExecutorProfile> {
        self.executors
            .values()
            .map(|e| e.profile())
            .filter(|p| p.kind == kind)
            .cloned()
            .collect()
    }

    /// Executors that accept `category`, ascending by id.
    pub fn capable(&self, category: TaskCategory) -> Vec<Arc<dyn TaskExecutor>> {
        self.executors
            .values()
            .filter(|e| e.profile().supports(category))
            .cloned()
            .collect()
    }

    /// Number of executors.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.executors.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(ExecutorProfile);

    #[async_trait]
    impl TaskExecutor for Fixed {
        fn profile(&self) -> &ExecutorProfile {
            &self.0
        }

        async fn execute(&self, _task: &Task) -> anyhow::Result<TaskOutcome> {
            Ok(TaskOutcome::success(1.0, "done"))
        }
    }

    #[tokio::test]
    async fn test_registry_lookup_and_filters() {
        let mut tool = ExecutorProfile::model("terraform", 0.5, 0, 0.5, 0.0);
        tool.kind = ExecutorKind::Tool;

        let registry = ExecutorRegistry::new()
            .with(Arc::new(Fixed(ExecutorProfile::model("b-model", 0.9, 100_000, 0.5, 0.01))))
            .with(Arc::new(Fixed(
                ExecutorProfile::model("a-model", 0.8, 100_000, 0.9, 0.001)
                    .with_categories([TaskCategory::Frontend]),
            )))
            .with(Arc::new(Fixed(tool)));

        assert_eq!(registry.len(), 3);
        let models: Vec<_> = registry.profiles(ExecutorKind::Model).into_iter().map(|p| p.id).collect();
        assert_eq!(models, vec![ExecutorId::from("a-model"), ExecutorId::from("b-model")]);
        assert_eq!(registry.profiles(ExecutorKind::Tool).len(), 1);
        assert_eq!(registry.capable(TaskCategory::Backend).len(), 2);

        let executor = registry.get(&"b-model".into()).unwrap();
        assert!(executor.propose(&Task::new("t", "x")).await.is_none());
        assert!(executor.execute(&Task::new("t", "x")).await.unwrap().success);
        assert!(registry.get(&"missing".into()).is_none());
    }
}
