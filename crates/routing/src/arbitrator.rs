//! Arbitrator - resolves competing execution proposals into a single decision.

use std::cmp::Ordering;

use archon_core::{
    Decision, DecisionId, PhaseContext, Proposal, ScoredProposal, Task, TaskId, TaskOutcome,
};
use archon_storage::Storage;
use tracing::{info, warn};

use crate::config::ArbitrationConfig;
use crate::error::{Result, RoutingError};

/// Quality range that is considered borderline and gets a second opinion.
const BORDERLINE_QUALITY: std::ops::RangeInclusive<f64> = 0.7..=0.8;

/// Maximum characters of an alternative's summary quoted in the reasoning.
const SUMMARY_PREVIEW_CHARS: usize = 100;

/// Scores proposals and records the winning one as an immutable decision.
pub struct Arbitrator<S: Storage> {
    storage: S,
    config: ArbitrationConfig,
}

impl<S: Storage> Arbitrator<S> {
    /// Create an arbitrator. Weights are checked here, never per call.
    pub fn new(storage: S, config: ArbitrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { storage, config })
    }

    /// Composite score of one proposal in the given phase.
    pub fn score_proposal(&self, proposal: &Proposal, phase: &PhaseContext) -> f64 {
        let w = &self.config.weights;
        let risk = 1.0 - proposal.risk;
        let complexity = 1.0 - proposal.complexity * phase.phase_weight();
        let duration = 1.0 / (1.0 + proposal.estimated_hours / self.config.duration_normalization_hours);

        w.risk * risk + w.complexity * complexity + w.duration * duration + w.alignment * self.config.goal_alignment
    }

    /// Score and order proposals, best first.
    ///
    /// Ties go to the lower risk, then to the smaller proposer id.
    pub fn rank(&self, proposals: Vec<Proposal>, phase: &PhaseContext) -> Vec<ScoredProposal> {
        let mut scored: Vec<ScoredProposal> = proposals
            .into_iter()
            .map(|proposal| {
                let score = self.score_proposal(&proposal, phase);
                ScoredProposal { proposal, score }
            })
            .collect();
        scored.sort_by(compare_ranked);
        scored
    }

    /// Resolve competing proposals for `task` and append the decision.
    pub async fn resolve_conflict(
        &mut self,
        task: &Task,
        proposals: Vec<Proposal>,
        phase: PhaseContext,
    ) -> Result<Decision> {
        if proposals.is_empty() {
            warn!("Arbitration for task {} requested without proposals", task.id);
            return Err(RoutingError::NoProposals(task.id.clone()));
        }
        for proposal in &proposals {
            validate_proposal(proposal)?;
        }

        let candidates = self.rank(proposals, &phase);
        let chosen = candidates[0].clone();
        let margin = candidates.get(1).map(|runner_up| chosen.score - runner_up.score);
        let reasoning = generate_reasoning(task, &candidates, &phase);

        let decision = Decision {
            id: DecisionId::new(),
            task_id: task.id.clone(),
            chosen,
            candidates,
            margin,
            phase: phase.phase,
            reasoning,
            timestamp: chrono::Utc::now(),
        };

        self.storage.append_decision(&decision).await?;

        info!(
            "Decision {} for task {}: {} wins (score {:.3})",
            decision.id,
            task.id,
            decision.winner(),
            decision.chosen.score
        );
        Ok(decision)
    }

    /// Whether a result should be deliberated by several executors.
    ///
    /// Triggered by an explicit request, borderline quality, or proposed
    /// architecture changes.
    pub fn needs_deliberation(outcome: &TaskOutcome) -> bool {
        outcome.needs_deliberation
            || BORDERLINE_QUALITY.contains(&outcome.quality_score)
            || outcome.architecture_changes
    }

    /// Decisions recorded so far, optionally for one task.
    pub async fn decision_history(&self, task: Option<&TaskId>) -> Result<Vec<Decision>> {
        Ok(self.storage.list_decisions(task).await?)
    }

    /// Get a reference to the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

fn compare_ranked(a: &ScoredProposal, b: &ScoredProposal) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.proposal.risk.total_cmp(&b.proposal.risk))
        .then_with(|| a.proposal.proposer.cmp(&b.proposal.proposer))
}

fn validate_proposal(p: &Proposal) -> Result<()> {
    let invalid = |reason: String| RoutingError::InvalidProposal {
        proposer: p.proposer.clone(),
        reason,
    };
    if !(0.0..=1.0).contains(&p.risk) {
        return Err(invalid(format!("risk {} outside [0, 1]", p.risk)));
    }
    if !(0.0..=1.0).contains(&p.complexity) {
        return Err(invalid(format!("complexity {} outside [0, 1]", p.complexity)));
    }
    if !p.estimated_hours.is_finite() || p.estimated_hours <= 0.0 {
        return Err(invalid(format!("estimated hours {} must be positive", p.estimated_hours)));
    }
    Ok(())
}

fn generate_reasoning(task: &Task, ranked: &[ScoredProposal], phase: &PhaseContext) -> String {
    let best = &ranked[0];
    let p = &best.proposal;

    let mut reasoning = format!(
        "Selected {}'s proposal for task {} (score: {:.3}",
        p.proposer, task.id, best.score
    );
    match ranked.get(1) {
        Some(runner_up) => reasoning.push_str(&format!(
            ", margin {:.3} over {} at {:.3}).\n",
            best.score - runner_up.score,
            runner_up.proposal.proposer,
            runner_up.score
        )),
        None => reasoning.push_str(", uncontested).\n"),
    }

    if !p.reasoning.is_empty() {
        reasoning.push_str(&format!("Rationale: {}\n", p.reasoning));
    }
    reasoning.push_str(&format!(
        "Risk: {:.2}, Complexity: {:.2}, Est. Time: {:.1}h, Phase: {} (complexity weight {:.2})\n",
        p.risk,
        p.complexity,
        p.estimated_hours,
        phase.phase,
        phase.phase_weight()
    ));

    if ranked.len() > 1 {
        reasoning.push_str("Alternative proposals considered:\n");
        for alt in &ranked[1..] {
            let preview: String = alt.proposal.summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
            reasoning.push_str(&format!(
                "- {} (score: {:.3}): {}\n",
                alt.proposal.proposer, alt.score, preview
            ));
        }
    }

    reasoning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArbitrationWeights;
    use archon_core::{ProjectPhase, TaskId};
    use archon_storage::MemoryStorage;

    fn arbitrator() -> Arbitrator<MemoryStorage> {
        Arbitrator::new(MemoryStorage::new(), ArbitrationConfig::default()).unwrap()
    }

    fn mvp() -> PhaseContext {
        PhaseContext::new(ProjectPhase::Mvp)
    }

    #[test]
    fn test_invalid_weights_rejected_at_construction() {
        let config = ArbitrationConfig {
            weights: ArbitrationWeights {
                risk: 0.5,
                complexity: 0.3,
                duration: 0.2,
                alignment: 0.1,
            },
            ..Default::default()
        };
        let result = Arbitrator::new(MemoryStorage::new(), config);
        assert!(matches!(result, Err(RoutingError::InvalidWeights { name: "arbitration", .. })));
    }

    #[test]
    fn test_score_formula() {
        let arb = arbitrator();
        let p = Proposal::new("x", "plan", 0.5, 0.4, 10.0);
        // 0.4 * 0.5 + 0.3 * (1 - 0.4 * 0.5) + 0.2 * 0.5 + 0.1 * 1.0
        let expected = 0.2 + 0.24 + 0.1 + 0.1;
        assert!((arb.score_proposal(&p, &mvp()) - expected).abs() < 1e-9);

        // production weighs complexity fully
        let prod = PhaseContext::new(ProjectPhase::Production);
        assert!(arb.score_proposal(&p, &prod) < arb.score_proposal(&p, &mvp()));
    }

    #[tokio::test]
    async fn test_lower_risk_and_complexity_wins_in_mvp() {
        let mut arb = arbitrator();
        let task = Task::new("auth", "Implement authentication");
        let proposals = vec![
            Proposal::new("backend-a", "custom OAuth server", 0.6, 0.8, 6.0),
            Proposal::new("backend-b", "managed identity provider", 0.3, 0.4, 6.0),
        ];

        let decision = arb.resolve_conflict(&task, proposals, mvp()).await.unwrap();
        assert_eq!(decision.winner().as_str(), "backend-b");
        assert_eq!(decision.candidates.len(), 2);
        assert!(decision.margin.unwrap() > 0.0);
        assert_eq!(decision.phase, ProjectPhase::Mvp);
    }

    #[tokio::test]
    async fn test_reasoning_names_winner_score_and_margin() {
        let mut arb = arbitrator();
        let task = Task::new("cache", "Add caching");
        let proposals = vec![
            Proposal::new("slow", "write-through cache", 0.2, 0.2, 20.0),
            Proposal::new("fast", "read-through cache", 0.2, 0.2, 2.0)
                .with_reasoning("fewer moving parts"),
        ];
        let decision = arb.resolve_conflict(&task, proposals, mvp()).await.unwrap();

        let margin = format!("{:.3}", decision.margin.unwrap());
        let score = format!("{:.3}", decision.chosen.score);
        assert!(decision.reasoning.contains("Selected fast's proposal"));
        assert!(decision.reasoning.contains(&score));
        assert!(decision.reasoning.contains(&format!("margin {margin} over slow")));
        assert!(decision.reasoning.contains("fewer moving parts"));
        assert!(decision.reasoning.contains("- slow"));
    }

    #[tokio::test]
    async fn test_no_proposals_is_an_error() {
        let mut arb = arbitrator();
        let task = Task::new("t", "anything");
        let err = arb.resolve_conflict(&task, vec![], mvp()).await.unwrap_err();
        assert!(matches!(err, RoutingError::NoProposals(id) if id == TaskId::from("t")));
        assert!(arb.decision_history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_proposal_rejected() {
        let mut arb = arbitrator();
        let task = Task::new("t", "anything");
        let err = arb
            .resolve_conflict(&task, vec![Proposal::new("p", "x", 1.5, 0.1, 1.0)], mvp())
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::InvalidProposal { .. }));
    }

    #[tokio::test]
    async fn test_ties_break_on_risk_then_proposer() {
        let arb = arbitrator();
        // identical proposals from different proposers
        let ranked = arb.rank(
            vec![
                Proposal::new("zeta", "a", 0.2, 0.2, 1.0),
                Proposal::new("alpha", "b", 0.2, 0.2, 1.0),
            ],
            &mvp(),
        );
        assert_eq!(ranked[0].proposal.proposer.as_str(), "alpha");

        let cfg = ArbitrationConfig {
            weights: ArbitrationWeights {
                risk: 0.0,
                complexity: 0.0,
                duration: 0.0,
                alignment: 1.0,
            },
            ..Default::default()
        };
        let flat = Arbitrator::new(MemoryStorage::new(), cfg).unwrap();
        let ranked = flat.rank(
            vec![
                Proposal::new("alpha", "a", 0.9, 0.1, 1.0),
                Proposal::new("zeta", "b", 0.1, 0.9, 1.0),
            ],
            &mvp(),
        );
        assert_eq!(ranked[0].proposal.proposer.as_str(), "zeta");
    }

    #[tokio::test]
    async fn test_highest_score_always_selected() {
        let mut arb = arbitrator();
        let task = Task::new("grid", "grid search");
        let values = [0.1, 0.35, 0.6, 0.85];
        let mut proposals = Vec::new();
        for (i, risk) in values.iter().enumerate() {
            for (j, complexity) in values.iter().enumerate() {
                let hours = 1.0 + (i * 4 + j) as f64;
                proposals.push(Proposal::new(format!("p{i}{j}"), "variant", *risk, *complexity, hours));
            }
        }
        let phase = PhaseContext::new(ProjectPhase::Iteration);
        let best_score = proposals
            .iter()
            .map(|p| arb.score_proposal(p, &phase))
            .fold(f64::MIN, f64::max);

        let decision = arb.resolve_conflict(&task, proposals, phase).await.unwrap();
        assert_eq!(decision.chosen.score, best_score);
        assert!(decision.candidates.iter().all(|c| c.score <= decision.chosen.score));
    }

    #[tokio::test]
    async fn test_decisions_are_appended_to_history() {
        let mut arb = arbitrator();
        let a = Task::new("a", "first");
        let b = Task::new("b", "second");
        let single = || vec![Proposal::new("solo", "only option", 0.1, 0.1, 1.0)];

        let d1 = arb.resolve_conflict(&a, single(), mvp()).await.unwrap();
        assert!(d1.margin.is_none());
        assert!(d1.reasoning.contains("uncontested"));
        arb.resolve_conflict(&b, single(), mvp()).await.unwrap();
        arb.resolve_conflict(&a, single(), mvp()).await.unwrap();

        assert_eq!(arb.decision_history(None).await.unwrap().len(), 3);
        let for_a = arb.decision_history(Some(&TaskId::from("a"))).await.unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].id, d1.id);
    }

    #[test]
    fn test_needs_deliberation() {
        type Arb = Arbitrator<MemoryStorage>;
        assert!(!Arb::needs_deliberation(&TaskOutcome::success(0.95, "ok")));
        assert!(Arb::needs_deliberation(&TaskOutcome::success(0.75, "borderline")));

        let mut flagged = TaskOutcome::success(0.95, "asks");
        flagged.needs_deliberation = true;
        assert!(Arb::needs_deliberation(&flagged));

        let mut arch = TaskOutcome::success(0.95, "arch");
        arch.architecture_changes = true;
        assert!(Arb::needs_deliberation(&arch));
    }
}
