//! In-memory storage backend.

use std::collections::BTreeMap;
use async_trait::async_trait;
use archon_core::{Decision, PerformanceHistory, Task, TaskId};
use super::{Result, Storage, StorageError};

/// Storage that keeps everything in process memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    tasks: BTreeMap<TaskId, Task>,
    decisions: Vec<Decision>,
    performance: PerformanceHistory,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_task(&mut self, task: &Task) -> Result<()> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.values().cloned().collect())
    }

    async fn append_decision(&mut self, decision: &Decision) -> Result<()> {
        if self.decisions.iter().any(|d| d.id == decision.id) {
            return Err(StorageError::AlreadyExists(format!("decision {}", decision.id)));
        }
        self.decisions.push(decision.clone());
        Ok(())
    }

    async fn list_decisions(&self, task: Option<&TaskId>) -> Result<Vec<Decision>> {
        Ok(self
            .decisions
            .iter()
            .filter(|d| task.map_or(true, |t| &d.task_id == t))
            .cloned()
            .collect())
    }

    async fn load_performance(&self) -> Result<PerformanceHistory> {
        Ok(self.performance.clone())
    }

    async fn save_performance(&mut self, history: &PerformanceHistory) -> Result<()> {
        self.performance = history.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::{DecisionId, ProjectPhase, Proposal, ScoredProposal};

    fn decision(task: &str) -> Decision {
        let chosen = ScoredProposal {
            proposal: Proposal::new("tool", "run it", 0.1, 0.1, 1.0),
            score: 0.9,
        };
        Decision {
            id: DecisionId::new(),
            task_id: TaskId::from(task),
            chosen: chosen.clone(),
            candidates: vec![chosen],
            margin: None,
            phase: ProjectPhase::Production,
            reasoning: String::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_decisions_keep_append_order() {
        let mut storage = MemoryStorage::new();
        let first = decision("x");
        let second = decision("y");
        let third = decision("x");
        for d in [&first, &second, &third] {
            storage.append_decision(d).await.unwrap();
        }

        let all = storage.list_decisions(None).await.unwrap();
        assert_eq!(all, vec![first.clone(), second, third.clone()]);

        let for_x = storage.list_decisions(Some(&TaskId::from("x"))).await.unwrap();
        assert_eq!(for_x, vec![first.clone(), third]);

        assert!(matches!(
            storage.append_decision(&first).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }
}
