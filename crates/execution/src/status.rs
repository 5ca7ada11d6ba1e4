//! Status board - the shared, mutable view of task statuses.
//!
//! The graph itself never changes during a run; only statuses do. Every
//! mutation goes through the board's lock, and `try_start` is a
//! compare-and-set so one task is never handed to two executors.

use std::collections::{HashMap, VecDeque};

use archon_core::{TaskId, TaskStatus};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::graph::TaskGraph;
use crate::scheduler;

/// Errors from status transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    /// The task is not on the board
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// The transition is not allowed from the current status
    #[error("task {task} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task id
        task: TaskId,
        /// Current status
        from: TaskStatus,
        /// Requested status
        to: TaskStatus,
    },
}

/// Concurrent status map for the tasks of one graph.
#[derive(Debug, Default)]
pub struct StatusBoard {
    statuses: RwLock<HashMap<TaskId, TaskStatus>>,
}

impl StatusBoard {
    /// Board seeded with the statuses stored on the graph's tasks.
    pub fn from_graph(graph: &TaskGraph) -> Self {
        let statuses = graph.tasks().map(|t| (t.id.clone(), t.status)).collect();
        Self {
            statuses: RwLock::new(statuses),
        }
    }

    /// Current status of a task.
    pub async fn get(&self, id: &TaskId) -> Option<TaskStatus> {
        self.statuses.read().await.get(id).copied()
    }

    /// Copy of every status.
    pub async fn snapshot(&self) -> HashMap<TaskId, TaskStatus> {
        self.statuses.read().await.clone()
    }

    /// Add statuses for tasks a newer graph version introduced.
    pub async fn sync(&self, graph: &TaskGraph) {
        let mut statuses = self.statuses.write().await;
        for task in graph.tasks() {
            statuses.entry(task.id.clone()).or_insert(task.status);
        }
    }

    /// Executable tasks under the current statuses.
    pub async fn executable(&self, graph: &TaskGraph) -> Vec<TaskId> {
        let statuses = self.statuses.read().await;
        scheduler::get_executable_tasks(graph, &statuses)
    }

    /// Promote executable pending tasks to ready and return every
    /// executable task, ascending.
    pub async fn mark_ready(&self, graph: &TaskGraph) -> Vec<TaskId> {
        let mut statuses = self.statuses.write().await;
        let executable = scheduler::get_executable_tasks(graph, &statuses);
        for id in &executable {
            if statuses.get(id) == Some(&TaskStatus::Pending) {
                statuses.insert(id.clone(), TaskStatus::Ready);
            }
        }
        executable
    }

    /// Apply a checked transition and return the previous status.
    pub async fn transition(&self, id: &TaskId, to: TaskStatus) -> Result<TaskStatus, StatusError> {
        let mut statuses = self.statuses.write().await;
        apply(&mut statuses, id, to)
    }

    /// Claim a task for execution.
    ///
    /// Returns `Ok(false)` if the task is no longer startable, for example
    /// because another worker claimed it first.
    pub async fn try_start(&self, id: &TaskId) -> Result<bool, StatusError> {
        let mut statuses = self.statuses.write().await;
        let current = *statuses
            .get(id)
            .ok_or_else(|| StatusError::UnknownTask(id.clone()))?;
        if !current.is_startable() {
            debug!("Task {} not startable ({})", id, current);
            return Ok(false);
        }
        statuses.insert(id.clone(), TaskStatus::InProgress);
        Ok(true)
    }

    /// Mark an in-progress task completed.
    pub async fn complete(&self, id: &TaskId) -> Result<(), StatusError> {
        self.transition(id, TaskStatus::Completed).await.map(|_| ())
    }

    /// Mark an in-progress task failed and block everything downstream.
    ///
    /// Returns the tasks that became blocked, ascending.
    pub async fn fail(&self, graph: &TaskGraph, id: &TaskId) -> Result<Vec<TaskId>, StatusError> {
        let mut statuses = self.statuses.write().await;
        apply(&mut statuses, id, TaskStatus::Failed)?;

        let mut blocked = Vec::new();
        let mut queue: VecDeque<&TaskId> = graph.dependents_of(id).iter().collect();
        while let Some(next) = queue.pop_front() {
            match statuses.get(next).copied() {
                Some(s) if s.is_startable() => {
                    statuses.insert(next.clone(), TaskStatus::Blocked);
                    blocked.push(next.clone());
                }
                Some(TaskStatus::Blocked) => {}
                _ => continue,
            }
            queue.extend(graph.dependents_of(next));
        }

        blocked.sort();
        blocked.dedup();
        if !blocked.is_empty() {
            warn!("Task {} failed, blocked {} downstream task(s)", id, blocked.len());
        }
        Ok(blocked)
    }

    /// Reset a failed task to pending and unblock dependents with no other
    /// failed ancestor.
    ///
    /// Returns the tasks that were unblocked, ascending.
    pub async fn retry(&self, graph: &TaskGraph, id: &TaskId) -> Result<Vec<TaskId>, StatusError> {
        let mut statuses = self.statuses.write().await;
        let current = *statuses
            .get(id)
            .ok_or_else(|| StatusError::UnknownTask(id.clone()))?;
        if current != TaskStatus::Failed {
            return Err(StatusError::InvalidTransition {
                task: id.clone(),
                from: current,
                to: TaskStatus::Pending,
            });
        }
        statuses.insert(id.clone(), TaskStatus::Pending);

        let still_tainted = scheduler::failed_ancestry(graph, &statuses);
        let mut unblocked: Vec<TaskId> = statuses
            .iter()
            .filter(|(task, status)| **status == TaskStatus::Blocked && !still_tainted.contains(*task))
            .map(|(task, _)| task.clone())
            .collect();
        unblocked.sort();
        for task in &unblocked {
            statuses.insert(task.clone(), TaskStatus::Pending);
        }

        debug!("Retrying {}, unblocked {:?}", id, unblocked);
        Ok(unblocked)
    }
}

fn apply(
    statuses: &mut HashMap<TaskId, TaskStatus>,
    id: &TaskId,
    to: TaskStatus,
) -> Result<TaskStatus, StatusError> {
    let from = *statuses
        .get(id)
        .ok_or_else(|| StatusError::UnknownTask(id.clone()))?;
    if !from.can_transition_to(to) {
        return Err(StatusError::InvalidTransition {
            task: id.clone(),
            from,
            to,
        });
    }
    statuses.insert(id.clone(), to);
    Ok(from)
}
