//! Shared storage handle for concurrent users.

use std::sync::Arc;
use async_trait::async_trait;
use archon_core::{Decision, PerformanceHistory, Task, TaskId};
use tokio::sync::Mutex;
use super::{Result, Storage};

/// A cloneable handle that serializes access to one backend.
///
/// The engine and the arbitrator each hold a clone, so decisions and task
/// snapshots written from concurrently running tasks land in the same store.
pub struct SharedStorage<S: Storage> {
    inner: Arc<Mutex<S>>,
}

impl<S: Storage> SharedStorage<S> {
    /// Wrap a backend.
    pub fn new(storage: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Lock the backend for direct access.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, S> {
        self.inner.lock().await
    }
}

impl<S: Storage> Clone for SharedStorage<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<S: Storage> Storage for SharedStorage<S> {
    async fn save_task(&mut self, task: &Task) -> Result<()> {
        self.inner.lock().await.save_task(task).await
    }

    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.inner.lock().await.load_task(id).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.inner.lock().await.list_tasks().await
    }

    async fn append_decision(&mut self, decision: &Decision) -> Result<()> {
        self.inner.lock().await.append_decision(decision).await
    }

    async fn list_decisions(&self, task: Option<&TaskId>) -> Result<Vec<Decision>> {
        self.inner.lock().await.list_decisions(task).await
    }

    async fn load_performance(&self) -> Result<PerformanceHistory> {
        self.inner.lock().await.load_performance().await
    }

    async fn save_performance(&mut self, history: &PerformanceHistory) -> Result<()> {
        self.inner.lock().await.save_performance(history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    #[tokio::test]
    async fn test_clones_share_one_backend() {
        let shared = SharedStorage::new(MemoryStorage::new());
        let mut writer = shared.clone();
        writer.save_task(&Task::new("a", "first")).await.unwrap();

        let tasks = shared.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(shared.lock().await.list_tasks().await.unwrap().len(), 1);
    }
}
