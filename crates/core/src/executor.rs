//! Executor profiles - declared capabilities of models and tools.

use serde::{Deserialize, Serialize};
use crate::id::ExecutorId;
use crate::task::TaskCategory;

/// What kind of executor a profile describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// An AI model
    #[default]
    Model,
    /// An external CLI tool
    Tool,
}

/// Declared capability scores of one executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorProfile {
    /// Unique identifier
    pub id: ExecutorId,

    /// Model or tool
    #[serde(default)]
    pub kind: ExecutorKind,

    /// Reasoning strength (0.0 - 1.0)
    pub reasoning_strength: f64,

    /// Maximum context window in tokens
    pub max_context: u64,

    /// Speed score (0.0 - 1.0)
    pub speed: f64,

    /// Cost per 1k tokens
    pub cost_per_1k_tokens: f64,

    /// Categories this executor accepts; empty means any
    #[serde(default)]
    pub categories: Vec<TaskCategory>,
}

impl ExecutorProfile {
    /// Create a model profile accepting any category.
    pub fn model(
        id: impl Into<ExecutorId>,
        reasoning_strength: f64,
        max_context: u64,
        speed: f64,
        cost_per_1k_tokens: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ExecutorKind::Model,
            reasoning_strength,
            max_context,
            speed,
            cost_per_1k_tokens,
            categories: Vec::new(),
        }
    }

    /// Restrict the profile to some categories.
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = TaskCategory>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    /// Whether this executor accepts tasks of `category`.
    pub fn supports(&self, category: TaskCategory) -> bool {
        self.categories.is_empty() || self.categories.contains(&category)
    }

    /// The reference model catalog.
    pub fn default_catalog() -> Vec<ExecutorProfile> {
        vec![
            Self::model("gpt-4-turbo", 0.95, 128_000, 0.7, 0.01),
            Self::model("claude-3-opus", 0.93, 200_000, 0.5, 0.015),
            Self::model("claude-3-5-sonnet", 0.90, 200_000, 0.8, 0.003),
            Self::model("gemini-2.0-flash", 0.85, 1_000_000, 0.95, 0.0001),
        ]
    }
}

/// An external CLI tool that can replace an AI model for some task types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTool {
    /// Tool name
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Task types it can handle
    pub task_types: Vec<String>,

    /// Trust in the tool's source (0.0 - 1.0)
    pub trust_score: f64,

    /// Historical success rate (0.0 - 1.0)
    pub success_rate: f64,

    /// Output quality (0.0 - 1.0)
    pub performance_score: f64,

    /// Average run time
    #[serde(default)]
    pub avg_execution_time_ms: u64,

    /// Must run inside a sandbox
    #[serde(default)]
    pub sandbox_required: bool,

    /// Needs credentials to run
    #[serde(default)]
    pub requires_credentials: bool,
}

impl ExternalTool {
    /// Whether the tool handles `task_type`.
    pub fn supports(&self, task_type: &str) -> bool {
        self.task_types.iter().any(|t| t == task_type)
    }
}

/// Accumulated usage of one external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolUsage {
    /// Number of runs
    pub executions: u64,
    /// Successful runs
    pub successes: u64,
    /// Total run time
    pub total_time_ms: u64,
}

impl ToolUsage {
    /// Record one run.
    pub fn record(&mut self, success: bool, duration_ms: u64) {
        self.executions += 1;
        if success {
            self.successes += 1;
        }
        self.total_time_ms += duration_ms;
    }

    /// Observed success rate, if any runs were recorded.
    pub fn success_rate(&self) -> Option<f64> {
        (self.executions > 0).then(|| self.successes as f64 / self.executions as f64)
    }

    /// Observed average duration, if any runs were recorded.
    pub fn avg_time_ms(&self) -> Option<u64> {
        (self.executions > 0).then(|| self.total_time_ms / self.executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_supports_any_when_unrestricted() {
        let profile = ExecutorProfile::model("m", 0.9, 1000, 0.5, 0.01);
        assert!(profile.supports(TaskCategory::Frontend));

        let restricted = profile.with_categories([TaskCategory::Backend]);
        assert!(restricted.supports(TaskCategory::Backend));
        assert!(!restricted.supports(TaskCategory::Frontend));
    }

    #[test]
    fn test_tool_usage_rates() {
        let mut usage = ToolUsage::default();
        assert_eq!(usage.success_rate(), None);
        usage.record(true, 100);
        usage.record(false, 300);
        assert_eq!(usage.success_rate(), Some(0.5));
        assert_eq!(usage.avg_time_ms(), Some(200));
    }
}
