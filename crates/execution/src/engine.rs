//! The execution engine - drives a task graph to completion.
//!
//! Each pass of the loop:
//! ```text
//! Executable tasks -> Claim -> Route -> Execute -> (Deliberate) -> Record
//! ```
//! Independent tasks run concurrently on a `JoinSet`, bounded by the budget.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use archon_core::{
    Decision, DecisionId, ExecutorId, PerformanceHistory, PhaseContext, Task, TaskId, TaskOutcome, TaskStatus,
};
use archon_routing::{Arbitrator, ModelScorer, RoutingConfig, RoutingError};
use archon_storage::{SharedStorage, Storage};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionError, Result};
use crate::executor::ExecutorRegistry;
use crate::graph::TaskGraph;
use crate::selector::{ExecutorSelector, RoutingSelector};
use crate::status::{StatusBoard, StatusError};

/// Concurrency budget for a run.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Max tasks in flight at once
    pub max_concurrent: NonZeroUsize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_concurrent: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Budget {
    /// Set max concurrent tasks.
    pub fn with_max_concurrent(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent = max;
        self
    }
}

/// Configuration for the execution engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Project phase used when arbitrating
    pub phase: PhaseContext,
    /// Whether borderline results are deliberated
    pub deliberate: bool,
    /// Whether task snapshots are written to storage as statuses change
    pub persist_tasks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            phase: PhaseContext::default(),
            deliberate: true,
            persist_tasks: true,
        }
    }
}

/// What happened to one task during a run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    /// The task
    pub task_id: TaskId,
    /// Executor whose outcome was kept, if one was routed
    pub executor: Option<ExecutorId>,
    /// Final outcome
    pub outcome: TaskOutcome,
    /// Status after the run
    pub status: TaskStatus,
    /// Decision recorded during deliberation
    pub decision: Option<DecisionId>,
    /// Tasks blocked because this one failed
    pub blocked: Vec<TaskId>,
}

/// Result of [`ExecutionEngine::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Runs in completion order
    pub runs: Vec<TaskRun>,
    /// Completed tasks, ascending
    pub completed: Vec<TaskId>,
    /// Failed tasks, ascending
    pub failed: Vec<TaskId>,
    /// Blocked tasks, ascending
    pub blocked: Vec<TaskId>,
    /// Tasks that never became executable, ascending
    pub pending: Vec<TaskId>,
}

impl RunReport {
    fn new(runs: Vec<TaskRun>, statuses: &HashMap<TaskId, TaskStatus>) -> Self {
        let mut report = Self {
            runs,
            ..Default::default()
        };
        for (id, status) in statuses {
            let bucket = match status {
                TaskStatus::Completed => &mut report.completed,
                TaskStatus::Failed => &mut report.failed,
                TaskStatus::Blocked => &mut report.blocked,
                TaskStatus::Pending | TaskStatus::Ready | TaskStatus::InProgress => &mut report.pending,
            };
            bucket.push(id.clone());
        }
        report.completed.sort();
        report.failed.sort();
        report.blocked.sort();
        report.pending.sort();
        report
    }

    /// Whether every task completed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && self.pending.is_empty()
    }
}

/// The execution engine.
pub struct ExecutionEngine<S: Storage + 'static> {
    graph: Arc<TaskGraph>,
    board: Arc<StatusBoard>,
    registry: Arc<ExecutorRegistry>,
    selector: Arc<dyn ExecutorSelector>,
    arbitrator: Arc<Mutex<Arbitrator<SharedStorage<S>>>>,
    storage: SharedStorage<S>,
    history: Arc<Mutex<PerformanceHistory>>,
    budget: Budget,
    config: EngineConfig,
}

impl<S: Storage + 'static> ExecutionEngine<S> {
    /// Create an engine for `graph`.
    ///
    /// Routing weights are validated here; a bad config never reaches a run.
    pub fn new(graph: TaskGraph, registry: ExecutorRegistry, storage: S, routing: &RoutingConfig) -> Result<Self> {
        let storage = SharedStorage::new(storage);
        let arbitrator = Arbitrator::new(storage.clone(), routing.arbitration)?;
        let selector = RoutingSelector::new(routing)?;

        Ok(Self {
            board: Arc::new(StatusBoard::from_graph(&graph)),
            graph: Arc::new(graph),
            registry: Arc::new(registry),
            selector: Arc::new(selector),
            arbitrator: Arc::new(Mutex::new(arbitrator)),
            storage,
            history: Arc::new(Mutex::new(PerformanceHistory::new())),
            budget: Budget::default(),
            config: EngineConfig::default(),
        })
    }

    /// Set the executor selector.
    pub fn with_selector(mut self, selector: Arc<dyn ExecutorSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Set the budget.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The current graph version.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// The status board.
    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Get a reference to the storage.
    pub fn storage(&self) -> &SharedStorage<S> {
        &self.storage
    }

    /// Replace the graph with an extended version; existing statuses are kept.
    pub async fn extend(&mut self, tasks: Vec<Task>) -> Result<()> {
        let next = self.graph.extend(tasks)?;
        self.board.sync(&next).await;
        info!("Graph extended to v{} ({} tasks)", next.version(), next.len());
        self.graph = Arc::new(next);
        Ok(())
    }

    /// Write every task of the graph, with its current status, to storage.
    pub async fn persist_graph(&self) -> Result<()> {
        let statuses = self.board.snapshot().await;
        let mut storage = self.storage.clone();
        for task in self.graph.tasks() {
            let mut task = task.clone();
            if let Some(status) = statuses.get(&task.id) {
                task.status = *status;
            }
            storage.save_task(&task).await?;
        }
        Ok(())
    }

    /// Reset a failed task so the next run picks it up again.
    ///
    /// Returns the dependents that were unblocked.
    pub async fn retry(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        let unblocked = self.board.retry(&self.graph, id).await?;
        info!("Task {} reset for retry", id);
        if self.config.persist_tasks {
            let mut storage = self.storage.clone();
            for task_id in std::iter::once(id).chain(unblocked.iter()) {
                if let Some(task) = self.graph.task(task_id) {
                    let mut task = task.clone();
                    task.status = TaskStatus::Pending;
                    task.completed_at = None;
                    storage.save_task(&task).await?;
                }
            }
        }
        Ok(unblocked)
    }

    /// Run until no task is executable and nothing is in flight.
    ///
    /// If a worker hits a store error, nothing new is started, the tasks
    /// already in flight are drained, and the first error is returned. A
    /// task left `InProgress` by the failed worker is marked `Failed`.
    pub async fn run(&self) -> Result<RunReport> {
        let loaded = self.storage.load_performance().await?;
        *self.history.lock().await = loaded;

        let graph = Arc::clone(&self.graph);
        let worker = self.worker();
        let limit = self.budget.max_concurrent.get();

        let mut workers: JoinSet<Result<TaskRun>> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, TaskId> = HashMap::new();
        let mut runs = Vec::new();
        let mut first_error: Option<ExecutionError> = None;

        info!("Running graph v{}: {} tasks, up to {} at once", graph.version(), graph.len(), limit);

        loop {
            let ready = if first_error.is_none() {
                self.board.mark_ready(&graph).await
            } else {
                Vec::new()
            };
            for id in ready {
                if in_flight.len() >= limit {
                    break;
                }
                if !self.board.try_start(&id).await? {
                    continue;
                }
                debug!("Starting task {}", id);
                let worker = worker.clone();
                let task_id = id.clone();
                let handle = workers.spawn(async move { worker.run(task_id).await });
                in_flight.insert(handle.id(), id);
            }

            let Some(joined) = workers.join_next_with_id().await else {
                break;
            };

            match joined {
                Ok((handle, Ok(run))) => {
                    in_flight.remove(&handle);
                    runs.push(run);
                }
                Ok((handle, Err(e))) => {
                    if let Some(id) = in_flight.remove(&handle) {
                        error!("Worker for task {} failed: {}", id, e);
                        let reason = format!("worker error: {e}");
                        runs.extend(self.fail_stranded(&graph, id, reason).await?);
                    }
                    first_error.get_or_insert(e);
                }
                Err(err) => {
                    let Some(id) = in_flight.remove(&err.id()) else {
                        continue;
                    };
                    error!("Worker for task {} died: {}", id, err);
                    let reason = format!("worker died: {err}");
                    runs.extend(self.fail_stranded(&graph, id, reason).await?);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let report = RunReport::new(runs, &self.board.snapshot().await);
        info!(
            "Run finished: {} completed, {} failed, {} blocked, {} pending",
            report.completed.len(),
            report.failed.len(),
            report.blocked.len(),
            report.pending.len()
        );
        Ok(report)
    }

    /// Fail a task whose worker ended without settling its status.
    async fn fail_stranded(&self, graph: &TaskGraph, id: TaskId, reason: String) -> Result<Option<TaskRun>> {
        if self.board.get(&id).await != Some(TaskStatus::InProgress) {
            return Ok(None);
        }
        let blocked = self.board.fail(graph, &id).await?;
        Ok(Some(TaskRun {
            task_id: id,
            executor: None,
            outcome: TaskOutcome::failure(reason),
            status: TaskStatus::Failed,
            decision: None,
            blocked,
        }))
    }

    fn worker(&self) -> Worker<S> {
        Worker {
            graph: Arc::clone(&self.graph),
            board: Arc::clone(&self.board),
            registry: Arc::clone(&self.registry),
            selector: Arc::clone(&self.selector),
            arbitrator: Arc::clone(&self.arbitrator),
            storage: self.storage.clone(),
            history: Arc::clone(&self.history),
            config: self.config,
        }
    }
}

/// Everything one spawned task needs, shared with the engine.
struct Worker<S: Storage + 'static> {
    graph: Arc<TaskGraph>,
    board: Arc<StatusBoard>,
    registry: Arc<ExecutorRegistry>,
    selector: Arc<dyn ExecutorSelector>,
    arbitrator: Arc<Mutex<Arbitrator<SharedStorage<S>>>>,
    storage: SharedStorage<S>,
    history: Arc<Mutex<PerformanceHistory>>,
    config: EngineConfig,
}

impl<S: Storage + 'static> Clone for Worker<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            board: Arc::clone(&self.board),
            registry: Arc::clone(&self.registry),
            selector: Arc::clone(&self.selector),
            arbitrator: Arc::clone(&self.arbitrator),
            storage: self.storage.clone(),
            history: Arc::clone(&self.history),
            config: self.config,
        }
    }
}

impl<S: Storage + 'static> Worker<S> {
    async fn run(self, id: TaskId) -> Result<TaskRun> {
        let task = self
            .graph
            .task(&id)
            .cloned()
            .ok_or_else(|| StatusError::UnknownTask(id.clone()))?;

        let history = self.history.lock().await.clone();
        let mut executor = match self.selector.select(&task, &self.registry, &history) {
            Ok(executor) => executor,
            Err(e) => {
                warn!("No executor for task {}: {}", task.id, e);
                return self.finish(task, None, TaskOutcome::failure(e.to_string()), None).await;
            }
        };

        let mut outcome = self.execute(&task, &executor).await;
        let mut decision = None;

        if outcome.success && self.config.deliberate && Arbitrator::<SharedStorage<S>>::needs_deliberation(&outcome) {
            info!("Deliberating on task {} (quality {:.2})", task.id, outcome.quality_score);
            match self.deliberate(&task).await {
                Ok(d) => {
                    let winner = d.winner().clone();
                    decision = Some(d.id);
                    if winner != executor && self.registry.get(&winner).is_some() {
                        info!("Re-running task {} with {} after deliberation", task.id, winner);
                        self.record(&task, &executor, &outcome).await?;
                        outcome = self.execute(&task, &winner).await;
                        executor = winner;
                    }
                }
                Err(RoutingError::NoProposals(_)) => {
                    outcome = TaskOutcome::failure("deliberation requested but no executor proposed an approach");
                }
                Err(RoutingError::Storage(e)) => return Err(e.into()),
                Err(e) => {
                    outcome = TaskOutcome::failure(format!("deliberation failed: {e}"));
                }
            }
        }

        self.finish(task, Some(executor), outcome, decision).await
    }

    async fn execute(&self, task: &Task, executor_id: &ExecutorId) -> TaskOutcome {
        let Some(executor) = self.registry.get(executor_id) else {
            return TaskOutcome::failure(format!("executor {executor_id} is not registered"));
        };

        debug!("Executing task {} with {}", task.id, executor_id);
        let started = Instant::now();
        let mut outcome = match executor.execute(task).await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::failure(format!("{e:#}")),
        };
        if outcome.duration_ms == 0 {
            outcome.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        }
        outcome
    }

    async fn deliberate(&self, task: &Task) -> std::result::Result<Decision, RoutingError> {
        let mut proposals = Vec::new();
        for executor in self.registry.capable(task.category) {
            if let Some(proposal) = executor.propose(task).await {
                proposals.push(proposal);
            }
        }
        debug!("Collected {} proposal(s) for task {}", proposals.len(), task.id);

        self.arbitrator
            .lock()
            .await
            .resolve_conflict(task, proposals, self.config.phase)
            .await
    }

    /// Feed an outcome to the selector and fold it into the stored history.
    async fn record(&self, task: &Task, executor: &ExecutorId, outcome: &TaskOutcome) -> Result<()> {
        self.selector.observe(executor, outcome);
        let performance = if outcome.meets_threshold(task) {
            outcome.quality_score
        } else {
            0.0
        };
        let mut history = self.history.lock().await;
        ModelScorer::update_historical_performance(&mut history, task.category, executor, performance);
        self.storage.clone().save_performance(&history).await?;
        Ok(())
    }

    async fn finish(
        &self,
        mut task: Task,
        executor: Option<ExecutorId>,
        outcome: TaskOutcome,
        decision: Option<DecisionId>,
    ) -> Result<TaskRun> {
        let accepted = outcome.meets_threshold(&task);

        // status is settled before anything is persisted
        let (status, blocked) = if accepted {
            self.board.complete(&task.id).await?;
            info!("Task {} completed (quality {:.2})", task.id, outcome.quality_score);
            (TaskStatus::Completed, Vec::new())
        } else {
            if outcome.success {
                warn!(
                    "Task {} quality {:.2} below threshold {:.2}",
                    task.id, outcome.quality_score, task.quality_threshold
                );
            } else {
                warn!("Task {} failed: {}", task.id, outcome.summary);
            }
            let blocked = self.board.fail(&self.graph, &task.id).await?;
            (TaskStatus::Failed, blocked)
        };

        if let Some(executor) = &executor {
            self.record(&task, executor, &outcome).await?;
        }

        if self.config.persist_tasks {
            let mut storage = self.storage.clone();
            task.status = status;
            if accepted {
                task.completed_at = Some(chrono::Utc::now());
            }
            storage.save_task(&task).await?;
            for id in &blocked {
                if let Some(dependent) = self.graph.task(id) {
                    let mut dependent = dependent.clone();
                    dependent.status = TaskStatus::Blocked;
                    storage.save_task(&dependent).await?;
                }
            }
        }

        Ok(TaskRun {
            task_id: task.id,
            executor,
            outcome,
            status,
            decision,
            blocked,
        })
    }
}
