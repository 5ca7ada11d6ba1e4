//! Model scorer - selects the executor for a task by weighted multi-criteria scoring.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use archon_core::{ExecutorId, ExecutorProfile, PerformanceHistory, Task, TaskCategory};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ScoringPenalties, ScoringWeights};
use crate::error::{Result, RoutingError};

/// Keywords that mark a task as reasoning-heavy.
const REASONING_KEYWORDS: &[&str] = &["architecture", "design", "security", "optimization"];

/// What a task needs from its executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskRequirements {
    /// Required reasoning depth (0.0 - 1.0)
    pub reasoning_depth: f64,
    /// Required context window in tokens
    pub context_tokens: u64,
    /// Importance of speed (0.0 - 1.0)
    pub speed_priority: f64,
    /// Maximum cost per 1k tokens
    pub cost_ceiling: f64,
}

impl TaskRequirements {
    /// Derive requirements from a task's context.
    ///
    /// Without an explicit reasoning depth, descriptions mentioning
    /// architecture, design, security or optimization get 0.9, others 0.5.
    pub fn from_task(task: &Task) -> Self {
        let reasoning_depth = task.context.reasoning_depth.unwrap_or_else(|| {
            let description = task.description.to_lowercase();
            if REASONING_KEYWORDS.iter().any(|kw| description.contains(kw)) {
                0.9
            } else {
                0.5
            }
        });

        Self {
            reasoning_depth,
            context_tokens: task.context.context_tokens,
            speed_priority: task.context.speed_priority,
            cost_ceiling: task.context.cost_ceiling,
        }
    }
}

/// Per-dimension scores of one executor for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Reasoning match
    pub reasoning: f64,
    /// Context adequacy
    pub context: f64,
    /// Speed match
    pub speed: f64,
    /// Cost efficiency
    pub cost: f64,
    /// Weighted sum of the dimensions
    pub composite: f64,
    /// Historical performance multiplier
    pub multiplier: f64,
    /// `composite * multiplier`
    pub total: f64,
}

/// Result of scoring a catalog for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Winning executor
    pub best: ExecutorId,
    /// Final score of every eligible executor
    pub scores: BTreeMap<ExecutorId, f64>,
    /// Dimension scores for the audit trail
    pub breakdowns: BTreeMap<ExecutorId, ScoreBreakdown>,
}

impl Selection {
    /// Final score of the winner.
    pub fn best_score(&self) -> f64 {
        self.scores.get(&self.best).copied().unwrap_or_default()
    }
}

/// Scores executor profiles against a task.
#[derive(Debug, Clone)]
pub struct ModelScorer {
    weights: ScoringWeights,
    penalties: ScoringPenalties,
}

impl ModelScorer {
    /// Create a scorer. Weights are checked here, never per call.
    pub fn new(weights: ScoringWeights, penalties: ScoringPenalties) -> Result<Self> {
        weights.validate()?;
        penalties.validate()?;
        Ok(Self { weights, penalties })
    }

    /// Scorer with the default weights.
    pub fn with_defaults() -> Self {
        Self {
            weights: ScoringWeights::default(),
            penalties: ScoringPenalties::default(),
        }
    }

    /// Score one profile, before the historical multiplier.
    pub fn breakdown(&self, profile: &ExecutorProfile, req: &TaskRequirements) -> ScoreBreakdown {
        let reasoning = (profile.reasoning_strength / req.reasoning_depth.max(0.1)).min(1.0);
        let context = if profile.max_context >= req.context_tokens {
            1.0
        } else {
            self.penalties.context
        };
        let speed = profile.speed * req.speed_priority;
        let cost = if profile.cost_per_1k_tokens <= req.cost_ceiling {
            1.0
        } else {
            self.penalties.cost
        };

        let w = &self.weights;
        let composite = w.reasoning * reasoning + w.context * context + w.speed * speed + w.cost * cost;

        ScoreBreakdown {
            reasoning,
            context,
            speed,
            cost,
            composite,
            multiplier: 1.0,
            total: composite,
        }
    }

    /// Pick the best executor for `task` among `candidates`.
    ///
    /// Candidates that do not accept the task's category are skipped. Exact
    /// score ties go to the cheaper executor, then to the smaller id.
    pub fn score_executors(
        &self,
        task: &Task,
        candidates: &[ExecutorProfile],
        history: &PerformanceHistory,
    ) -> Result<Selection> {
        let req = TaskRequirements::from_task(task);

        let mut scores = BTreeMap::new();
        let mut breakdowns = BTreeMap::new();
        let mut best: Option<(&ExecutorProfile, f64)> = None;

        for profile in candidates.iter().filter(|p| p.supports(task.category)) {
            let mut b = self.breakdown(profile, &req);
            b.multiplier = history.multiplier(task.category, &profile.id);
            b.total = b.composite * b.multiplier;

            debug!(
                "Scored {} for task {}: composite {:.3} x {:.3} = {:.3}",
                profile.id, task.id, b.composite, b.multiplier, b.total
            );

            best = match best {
                Some((current, score)) if !outranks(profile, b.total, current, score) => {
                    Some((current, score))
                }
                _ => Some((profile, b.total)),
            };

            scores.insert(profile.id.clone(), b.total);
            breakdowns.insert(profile.id.clone(), b);
        }

        let (winner, score) = best.ok_or_else(|| RoutingError::NoCandidates(task.id.clone()))?;

        info!(
            "Selected {} for {} task {} (score: {:.3})",
            winner.id, task.category, task.id, score
        );

        Ok(Selection {
            best: winner.id.clone(),
            scores,
            breakdowns,
        })
    }

    /// Fold an observed performance score into the history.
    pub fn update_historical_performance(
        history: &mut PerformanceHistory,
        category: TaskCategory,
        executor: &ExecutorId,
        performance: f64,
    ) -> f64 {
        let updated = history.record(category, executor, performance);
        debug!("Updated {} performance for {}: {:.3}", category, executor, updated);
        updated
    }
}

/// Whether `a` (scoring `a_score`) beats the current best `b`.
fn outranks(a: &ExecutorProfile, a_score: f64, b: &ExecutorProfile, b_score: f64) -> bool {
    let ord = a_score
        .total_cmp(&b_score)
        .then_with(|| b.cost_per_1k_tokens.total_cmp(&a.cost_per_1k_tokens))
        .then_with(|| b.id.cmp(&a.id));
    ord == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::TaskContext;

    fn task(description: &str) -> Task {
        Task::new("t1", description)
    }

    #[test]
    fn test_invalid_weights_rejected_at_construction() {
        let weights = ScoringWeights {
            reasoning: 0.4,
            context: 0.4,
            speed: 0.2,
            cost: 0.2,
        };
        let err = ModelScorer::new(weights, ScoringPenalties::default()).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidWeights { name: "scoring", .. }));
    }

    #[test]
    fn test_reasoning_depth_inferred_from_description() {
        assert_eq!(TaskRequirements::from_task(&task("Design the auth architecture")).reasoning_depth, 0.9);
        assert_eq!(TaskRequirements::from_task(&task("Rename a variable")).reasoning_depth, 0.5);

        let explicit = task("Design it").with_context(TaskContext {
            reasoning_depth: Some(0.3),
            ..Default::default()
        });
        assert_eq!(TaskRequirements::from_task(&explicit).reasoning_depth, 0.3);
    }

    #[test]
    fn test_breakdown_applies_penalties() {
        let scorer = ModelScorer::with_defaults();
        let req = TaskRequirements {
            reasoning_depth: 0.5,
            context_tokens: 500_000,
            speed_priority: 1.0,
            cost_ceiling: 0.001,
        };
        let profile = ExecutorProfile::model("small", 0.9, 100_000, 0.5, 0.01);
        let b = scorer.breakdown(&profile, &req);
        assert_eq!(b.reasoning, 1.0);
        assert_eq!(b.context, 0.5);
        assert_eq!(b.speed, 0.5);
        assert_eq!(b.cost, 0.3);
        assert!((b.composite - (0.4 + 0.1 + 0.1 + 0.06)).abs() < 1e-9);
    }

    #[test]
    fn test_selects_highest_and_reports_all_scores() {
        let scorer = ModelScorer::with_defaults();
        let catalog = ExecutorProfile::default_catalog();
        let selection = scorer
            .score_executors(&task("Write unit tests"), &catalog, &PerformanceHistory::new())
            .unwrap();

        assert_eq!(selection.scores.len(), catalog.len());
        let max = selection.scores.values().cloned().fold(f64::MIN, f64::max);
        assert_eq!(selection.best_score(), max);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = ModelScorer::with_defaults();
        let catalog = ExecutorProfile::default_catalog();
        let t = task("Optimize the query planner");
        let first = scorer.score_executors(&t, &catalog, &PerformanceHistory::new()).unwrap();
        for _ in 0..10 {
            let again = scorer.score_executors(&t, &catalog, &PerformanceHistory::new()).unwrap();
            assert_eq!(again.best, first.best);
            assert_eq!(again.scores, first.scores);
        }
    }

    #[test]
    fn test_tie_prefers_lower_cost_then_smaller_id() {
        let scorer = ModelScorer::with_defaults();
        let t = task("Refactor module");
        let history = PerformanceHistory::new();

        // identical capability, both under the cost ceiling
        let pricey = ExecutorProfile::model("a-pricey", 0.9, 100_000, 0.8, 0.02);
        let cheap = ExecutorProfile::model("z-cheap", 0.9, 100_000, 0.8, 0.001);
        let selection = scorer
            .score_executors(&t, &[pricey.clone(), cheap.clone()], &history)
            .unwrap();
        assert_eq!(selection.best, ExecutorId::from("z-cheap"));

        let twin = ExecutorProfile::model("b-twin", 0.9, 100_000, 0.8, 0.001);
        let selection = scorer.score_executors(&t, &[cheap, twin], &history).unwrap();
        assert_eq!(selection.best, ExecutorId::from("b-twin"));
    }

    #[test]
    fn test_history_multiplier_changes_winner() {
        let scorer = ModelScorer::with_defaults();
        let t = task("Build the login form").with_category(TaskCategory::Frontend);
        let a = ExecutorProfile::model("a", 0.9, 100_000, 0.8, 0.001);
        let b = ExecutorProfile::model("b", 0.9, 100_000, 0.7, 0.001);

        let mut history = PerformanceHistory::new();
        let baseline = scorer.score_executors(&t, &[a.clone(), b.clone()], &history).unwrap();
        assert_eq!(baseline.best, ExecutorId::from("a"));

        for _ in 0..5 {
            ModelScorer::update_historical_performance(&mut history, TaskCategory::Frontend, &a.id, 0.2);
        }
        let learned = scorer.score_executors(&t, &[a, b], &history).unwrap();
        assert_eq!(learned.best, ExecutorId::from("b"));
        assert!(learned.breakdowns[&ExecutorId::from("a")].multiplier < 1.0);
    }

    #[test]
    fn test_category_filter_and_no_candidates() {
        let scorer = ModelScorer::with_defaults();
        let t = task("Write docs").with_category(TaskCategory::Documentation);
        let backend_only = ExecutorProfile::model("be", 0.9, 100_000, 0.8, 0.001)
            .with_categories([TaskCategory::Backend]);

        let err = scorer
            .score_executors(&t, &[backend_only], &PerformanceHistory::new())
            .unwrap_err();
        assert!(matches!(err, RoutingError::NoCandidates(id) if id.as_str() == "t1"));
    }
}
