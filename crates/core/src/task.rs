//! Task model - the unit of work the scheduler orders and executes.

use serde::{Deserialize, Serialize};
use crate::id::TaskId;
use crate::Time;

/// Default quality threshold a task output must meet.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.8;

/// A task represents a unit of work produced by decomposing a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Human-readable description
    pub description: String,

    /// Capability the task requires
    #[serde(default)]
    pub category: TaskCategory,

    /// Tasks that must complete before this one can start
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Minimum quality score (0.0 - 1.0) for the output to be accepted; graph
    /// construction rejects values outside that range
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Routing hints
    #[serde(default)]
    pub context: TaskContext,

    /// Creation timestamp
    #[serde(default = "chrono::Utc::now")]
    pub created_at: Time,

    /// Completion timestamp
    #[serde(default)]
    pub completed_at: Option<Time>,
}

fn default_quality_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

impl Task {
    /// Create a pending task with no dependencies.
    pub fn new(id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category: TaskCategory::default(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            context: TaskContext::default(),
            created_at: chrono::Utc::now(),
            completed_at: None,
        }
    }

    /// Set the required capability.
    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    /// Add dependencies. Duplicates are collapsed, first occurrence wins.
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    /// Set the estimated duration in hours.
    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.context.estimated_hours = Some(hours);
        self
    }

    /// Set the quality threshold.
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Set the routing context.
    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }
}

/// Capability a task requires from its executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Server-side application code
    #[default]
    Backend,
    /// User interface work
    Frontend,
    /// Infrastructure, deployment and CI
    Devops,
    /// Audits and hardening
    Security,
    /// Writing or running tests
    Testing,
    /// Wiring services and third-party APIs together
    Integration,
    /// Docs and guides
    Documentation,
    /// Version control operations
    Git,
    /// Schemas, migrations and queries
    Database,
    /// Profiling and optimization
    Performance,
    /// Data processing and pipelines
    Data,
    /// System design
    Architect,
}

impl TaskCategory {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Devops => "devops",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::Integration => "integration",
            Self::Documentation => "documentation",
            Self::Git => "git",
            Self::Database => "database",
            Self::Performance => "performance",
            Self::Data => "data",
            Self::Architect => "architect",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or for a scheduling slot
    #[default]
    Pending,
    /// Dependencies satisfied, not yet started
    Ready,
    /// An executor is working on it
    InProgress,
    /// A dependency failed
    Blocked,
    /// Finished and accepted
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl TaskStatus {
    /// Whether a task in this status may be picked up by an executor.
    pub fn is_startable(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready)
    }

    /// Whether execution has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check whether moving to `next` is a legal transition.
    ///
    /// `Failed -> Pending` is the retry edge; `Completed` is final.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, InProgress)
                | (Pending, Blocked)
                | (Ready, InProgress)
                | (Ready, Pending)
                | (Ready, Blocked)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Blocked, Pending)
                | (Failed, Pending)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Routing hints attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskContext {
    /// Estimated duration in hours
    pub estimated_hours: Option<f64>,

    /// Context window the executor needs, in tokens
    pub context_tokens: u64,

    /// How much speed matters (0.0 - 1.0)
    pub speed_priority: f64,

    /// Maximum acceptable cost per 1k tokens
    pub cost_ceiling: f64,

    /// Required reasoning depth (0.0 - 1.0); inferred from the description when absent
    pub reasoning_depth: Option<f64>,

    /// Explicit task type used for tool routing; inferred when absent
    pub task_type: Option<String>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            estimated_hours: None,
            context_tokens: 10_000,
            speed_priority: 0.5,
            cost_ceiling: 0.05,
            reasoning_depth: None,
            task_type: None,
        }
    }
}

/// What an executor reports back after working a task.
///
/// Outcomes describe results, never the produced artifacts themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Whether the executor considers the run successful
    pub success: bool,

    /// Self-assessed or gated quality (0.0 - 1.0)
    pub quality_score: f64,

    /// Wall-clock duration
    pub duration_ms: u64,

    /// Short summary for logs and the audit trail
    pub summary: String,

    /// The executor asks for a second opinion
    #[serde(default)]
    pub needs_deliberation: bool,

    /// The run proposes architecture changes
    #[serde(default)]
    pub architecture_changes: bool,

    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskOutcome {
    /// A successful outcome with the given quality.
    pub fn success(quality_score: f64, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            quality_score,
            duration_ms: 0,
            summary: summary.into(),
            needs_deliberation: false,
            architecture_changes: false,
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            quality_score: 0.0,
            duration_ms: 0,
            summary: error.clone(),
            needs_deliberation: false,
            architecture_changes: false,
            error: Some(error),
        }
    }

    /// Whether the outcome is acceptable for `task`.
    pub fn meets_threshold(&self, task: &Task) -> bool {
        self.success && self.quality_score >= task.quality_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_collapse_duplicates() {
        let task = Task::new("d", "merge").with_dependencies(["b", "c", "b"]);
        assert_eq!(task.dependencies, vec![TaskId::from("b"), TaskId::from("c")]);
    }

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Blocked.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task = serde_json::from_str(
            r#"{"id": "a", "description": "Design the schema", "dependencies": ["b"]}"#,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.category, TaskCategory::Backend);
        assert_eq!(task.quality_threshold, DEFAULT_QUALITY_THRESHOLD);
        assert_eq!(task.context.context_tokens, 10_000);
    }

    #[test]
    fn test_outcome_threshold() {
        let task = Task::new("a", "x").with_quality_threshold(0.8);
        assert!(TaskOutcome::success(0.85, "ok").meets_threshold(&task));
        assert!(!TaskOutcome::success(0.75, "meh").meets_threshold(&task));
        assert!(!TaskOutcome::failure("boom").meets_threshold(&task));
    }
}
