//! Tool router - decides when an external CLI tool should replace an AI model.
//!
//! A tool is only chosen when its score beats the AI baseline for the task
//! type by the configured margin; marginal advantages stay with the model.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use archon_core::{ExternalTool, Task, ToolUsage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ToolRoutingConfig;
use crate::error::Result;

/// Task type used when nothing more specific matches.
pub const GENERAL_TASK_TYPE: &str = "general";

/// Outcome of a tool-vs-model decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDecision {
    /// Whether to use the tool
    pub use_tool: bool,
    /// The chosen tool, when `use_tool`
    pub tool: Option<String>,
    /// Task type the decision was made for
    pub task_type: String,
    /// Score of the best candidate tool, if any matched
    pub tool_score: Option<f64>,
    /// AI baseline for the task type
    pub baseline: f64,
    /// Human-readable explanation
    pub reasoning: String,
    /// Score of whichever side won
    pub confidence: f64,
}

/// Routes tasks between AI models and registered external tools.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    config: ToolRoutingConfig,
    tools: Vec<ExternalTool>,
    usage: BTreeMap<String, ToolUsage>,
}

impl ToolRouter {
    /// Create a router with the config's registry.
    pub fn new(config: ToolRoutingConfig) -> Result<Self> {
        config.validate()?;
        let tools = config.registry.clone();
        Ok(Self {
            config,
            tools,
            usage: BTreeMap::new(),
        })
    }

    /// Register (or replace) a tool.
    pub fn register(&mut self, tool: ExternalTool) {
        self.tools.retain(|t| t.name != tool.name);
        self.tools.push(tool);
    }

    /// Registered tools.
    pub fn tools(&self) -> &[ExternalTool] {
        &self.tools
    }

    /// Weighted tool score: trust, success rate, performance.
    pub fn score_tool(&self, tool: &ExternalTool) -> f64 {
        let w = &self.config.weights;
        w.trust * tool.trust_score + w.success_rate * tool.success_rate + w.performance * tool.performance_score
    }

    /// AI baseline for a task type.
    pub fn baseline(&self, task_type: &str) -> f64 {
        self.config
            .baselines
            .get(task_type)
            .copied()
            .unwrap_or(self.config.default_baseline)
    }

    /// Task type of `task`: the explicit one, else inferred from the description.
    pub fn task_type_for(task: &Task) -> String {
        task.context
            .task_type
            .clone()
            .unwrap_or_else(|| infer_task_type(&task.description).to_string())
    }

    /// Decide whether `task` should go to an external tool.
    pub fn should_use_tool(&self, task: &Task) -> ToolDecision {
        let task_type = Self::task_type_for(task);
        self.decide(&task_type)
    }

    /// Decide for a task type.
    pub fn decide(&self, task_type: &str) -> ToolDecision {
        let baseline = self.baseline(task_type);

        let mut best: Option<(&ExternalTool, f64)> = None;
        for tool in self.tools.iter().filter(|t| t.supports(task_type)) {
            let score = self.score_tool(tool);
            best = match best {
                Some((b, s)) if s > score || (s == score && b.name <= tool.name) => Some((b, s)),
                _ => Some((tool, score)),
            };
        }

        let Some((tool, score)) = best else {
            return ToolDecision {
                use_tool: false,
                tool: None,
                task_type: task_type.to_string(),
                tool_score: None,
                baseline,
                reasoning: format!("No tools found for task type: {task_type}"),
                confidence: 1.0,
            };
        };

        let threshold = baseline * (1.0 + self.config.margin);
        debug!(
            "Tool {} scores {:.3} for {} (baseline {:.3}, threshold {:.3})",
            tool.name, score, task_type, baseline, threshold
        );

        if score > threshold {
            let improvement = (score / baseline - 1.0) * 100.0;
            info!("Routing {} task to tool {}", task_type, tool.name);
            ToolDecision {
                use_tool: true,
                tool: Some(tool.name.clone()),
                task_type: task_type.to_string(),
                tool_score: Some(score),
                baseline,
                reasoning: format!(
                    "{} outperforms AI by {:.1}% (tool: {:.2}, AI baseline: {:.2})",
                    tool.name, improvement, score, baseline
                ),
                confidence: score,
            }
        } else {
            ToolDecision {
                use_tool: false,
                tool: None,
                task_type: task_type.to_string(),
                tool_score: Some(score),
                baseline,
                reasoning: format!(
                    "AI model performance ({:.2}) is competitive with best tool {} ({:.2}); \
                     tool must exceed {:.2}",
                    baseline, tool.name, score, threshold
                ),
                confidence: baseline,
            }
        }
    }

    /// Record a tool run and refresh the tool's success rate and average time.
    pub fn record_tool_usage(&mut self, name: &str, success: bool, duration_ms: u64) -> Option<ToolUsage> {
        let tool = self.tools.iter_mut().find(|t| t.name == name)?;
        let usage = self.usage.entry(name.to_string()).or_default();
        usage.record(success, duration_ms);

        if let Some(rate) = usage.success_rate() {
            tool.success_rate = rate;
        }
        if let Some(avg) = usage.avg_time_ms() {
            tool.avg_execution_time_ms = avg;
        }
        debug!("Recorded {} run for {}: success rate {:.2}", if success { "successful" } else { "failed" }, name, tool.success_rate);
        Some(*usage)
    }

    /// Usage recorded for a tool.
    pub fn usage(&self, name: &str) -> Option<&ToolUsage> {
        self.usage.get(name)
    }
}

struct TaskTypeRule {
    pattern: Regex,
    task_type: &'static str,
}

fn rules() -> &'static [TaskTypeRule] {
    static RULES: OnceLock<Vec<TaskTypeRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"\bsystem\b.*\b(diagram|architecture|design)\b|\b(diagram|architecture|design)\b.*\bsystem\b", "system_design_diagram"),
            (r"\b(diagram|architecture|design)\b", "architecture_diagram"),
            (r"\b(infrastructure|deploy\w*|provision\w*)\b", "infrastructure_provisioning"),
            (r"\be2e\b|end-to-end|browser test", "e2e_testing"),
            (r"static analysis|\blint\w*\b|security scan", "static_analysis"),
        ]
        .into_iter()
        .filter_map(|(pattern, task_type)| {
            Regex::new(&format!("(?i){pattern}"))
                .ok()
                .map(|pattern| TaskTypeRule { pattern, task_type })
        })
        .collect()
    })
}

/// Infer a task type from a free-text description by keyword.
pub fn infer_task_type(description: &str) -> &'static str {
    rules()
        .iter()
        .find(|rule| rule.pattern.is_match(description))
        .map(|rule| rule.task_type)
        .unwrap_or(GENERAL_TASK_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::TaskContext;

    fn tool(name: &str, task_type: &str, score: f64) -> ExternalTool {
        ExternalTool {
            name: name.to_string(),
            description: String::new(),
            task_types: vec![task_type.to_string()],
            trust_score: score,
            success_rate: score,
            performance_score: score,
            avg_execution_time_ms: 0,
            sandbox_required: false,
            requires_credentials: false,
        }
    }

    fn router_with(tools: Vec<ExternalTool>) -> ToolRouter {
        let config = ToolRoutingConfig {
            registry: tools,
            ..Default::default()
        };
        ToolRouter::new(config).unwrap()
    }

    #[test]
    fn test_infer_task_type() {
        assert_eq!(infer_task_type("Draw the system architecture diagram"), "system_design_diagram");
        assert_eq!(infer_task_type("Sketch an architecture diagram for auth"), "architecture_diagram");
        assert_eq!(infer_task_type("Provision the staging cluster"), "infrastructure_provisioning");
        assert_eq!(infer_task_type("Write E2E checks for checkout"), "e2e_testing");
        assert_eq!(infer_task_type("Run linters over the repo"), "static_analysis");
        assert_eq!(infer_task_type("Implement pagination"), GENERAL_TASK_TYPE);
    }

    #[test]
    fn test_tool_selected_above_margin() {
        // 0.92 > 0.70 * 1.2 = 0.84
        let router = router_with(vec![tool("eraser-cli", "system_design_diagram", 0.92)]);
        let decision = router.decide("system_design_diagram");
        assert!(decision.use_tool);
        assert_eq!(decision.tool.as_deref(), Some("eraser-cli"));
        assert!((decision.tool_score.unwrap() - 0.92).abs() < 1e-9);
        assert_eq!(decision.baseline, 0.70);
    }

    #[test]
    fn test_tool_rejected_below_margin() {
        // 0.80 < 0.84, the AI executor is used
        let router = router_with(vec![tool("eraser-cli", "system_design_diagram", 0.80)]);
        let decision = router.decide("system_design_diagram");
        assert!(!decision.use_tool);
        assert!(decision.tool.is_none());
        assert_eq!(decision.confidence, 0.70);
        assert!(decision.reasoning.contains("competitive"));
    }

    #[test]
    fn test_no_tool_for_task_type() {
        let router = router_with(vec![tool("terraform", "infrastructure_provisioning", 0.99)]);
        let decision = router.decide("general");
        assert!(!decision.use_tool);
        assert!(decision.tool_score.is_none());
    }

    #[test]
    fn test_explicit_task_type_wins_over_inference() {
        let router = router_with(vec![tool("playwright", "e2e_testing", 0.97)]);
        let task = Task::new("t", "Check the signup page").with_context(TaskContext {
            task_type: Some("e2e_testing".to_string()),
            ..Default::default()
        });
        let decision = router.should_use_tool(&task);
        assert_eq!(decision.task_type, "e2e_testing");
        assert!(decision.use_tool);
    }

    #[test]
    fn test_best_tool_is_chosen_deterministically() {
        let router = router_with(vec![
            tool("b-tool", "static_analysis", 0.99),
            tool("a-tool", "static_analysis", 0.99),
            tool("weak", "static_analysis", 0.5),
        ]);
        let decision = router.decide("static_analysis");
        assert!(decision.use_tool);
        assert_eq!(decision.tool.as_deref(), Some("a-tool"));
    }

    #[test]
    fn test_record_usage_updates_tool_metrics() {
        let mut router = router_with(vec![tool("eraser-cli", "system_design_diagram", 0.92)]);
        router.record_tool_usage("eraser-cli", true, 1000);
        let usage = router.record_tool_usage("eraser-cli", false, 3000).unwrap();
        assert_eq!(usage.executions, 2);

        let eraser = &router.tools()[0];
        assert_eq!(eraser.success_rate, 0.5);
        assert_eq!(eraser.avg_execution_time_ms, 2000);
        // 0.4 * 0.92 + 0.3 * 0.5 + 0.3 * 0.92 = 0.794 < 0.84
        assert!(!router.decide("system_design_diagram").use_tool);

        assert!(router.record_tool_usage("unknown", true, 1).is_none());
    }
}
