//! Deliberation — bounded multi-round claim expansion over the argument
//! graph.
//!
//! The deliberation state owns the graph for the turn and decides when
//! to stop. The turn runner drives the rounds: it executes follow-up
//! waves, applies their outputs through the reducer, then syncs the
//! merged claims back into the graph.

use std::collections::BTreeSet;

use qm_domain::claim::Claim;
use qm_domain::config::DeliberationConfig;

use crate::graph::{ArgumentGraph, ConsensusResult};

/// Why deliberation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A claim hit urgency 3 — speak now.
    CriticalUrgency,
    /// Every author deferred — stay silent.
    AllDeferred,
    /// Consensus reached the speak threshold.
    Consensus,
    /// Good-enough score that stopped improving after round 1.
    Converged,
    /// Nothing contested to argue about.
    NoContest,
    /// Round cap reached.
    RoundCap,
}

/// What to do next after a round completes.
#[derive(Debug)]
pub enum RoundPlan {
    /// Stop deliberating.
    Exit(ExitReason),
    /// Run a focused follow-up with these agents.
    Followup(Vec<String>),
}

pub struct DeliberationState {
    cfg: DeliberationConfig,
    graph: ArgumentGraph,
    round: u32,
    previous_score: Option<f64>,
}

impl DeliberationState {
    pub fn new(cfg: DeliberationConfig) -> Self {
        Self {
            cfg,
            graph: ArgumentGraph::new(),
            round: 0,
            previous_score: None,
        }
    }

    pub fn graph(&self) -> &ArgumentGraph {
        &self.graph
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Rounds completed (1-based once round 0 has run).
    pub fn rounds_run(&self) -> u32 {
        self.round + 1
    }

    /// Merge the workspace's active claims (already deduplicated by the
    /// reducer) into the graph.
    pub fn sync_claims(&mut self, claims: &[Claim]) {
        for claim in claims {
            self.graph.add(claim);
        }
    }

    pub fn consensus(&self) -> ConsensusResult {
        self.graph.consensus()
    }

    /// Decide whether to run another round. Called after each sync; when
    /// it returns a follow-up plan the caller executes those agents,
    /// applies their outputs, syncs, and calls this again.
    pub fn plan_next_round(&mut self) -> RoundPlan {
        let consensus = self.graph.consensus();

        if consensus.has_critical_urgency {
            return RoundPlan::Exit(ExitReason::CriticalUrgency);
        }
        if consensus.all_deferred {
            return RoundPlan::Exit(ExitReason::AllDeferred);
        }
        if consensus.overall_score >= self.cfg.consensus_threshold {
            return RoundPlan::Exit(ExitReason::Consensus);
        }
        if self.round >= 1
            && consensus.overall_score >= self.cfg.early_exit_threshold
            && self
                .previous_score
                .is_some_and(|prev| consensus.overall_score <= prev + 1e-9)
        {
            return RoundPlan::Exit(ExitReason::Converged);
        }
        if self.round + 1 >= self.cfg.max_rounds {
            return RoundPlan::Exit(ExitReason::RoundCap);
        }

        let contested = self.graph.contested_claims();
        if contested.is_empty() {
            return RoundPlan::Exit(ExitReason::NoContest);
        }

        let agents = self.followup_agents(&contested);
        self.previous_score = Some(consensus.overall_score);
        self.round += 1;

        if agents.is_empty() {
            RoundPlan::Exit(ExitReason::NoContest)
        } else {
            RoundPlan::Followup(agents)
        }
    }

    /// Union of the authors of contested claims and their opposers,
    /// in id order.
    fn followup_agents(&self, contested: &[&Claim]) -> Vec<String> {
        let mut agents = BTreeSet::new();
        for claim in contested {
            agents.insert(claim.source_agent.clone());
            for opposer_id in self.graph.opposers(&claim.id) {
                if let Some(opposer) = self.graph.get(opposer_id) {
                    agents.insert(opposer.source_agent.clone());
                }
            }
        }
        agents.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::claim::ClaimType;

    fn cfg() -> DeliberationConfig {
        DeliberationConfig::default()
    }

    fn claim(id: &str, text: &str, author: &str, urgency: u8, confidence: u8) -> Claim {
        Claim::new(id, text, ClaimType::Observation, author, urgency, confidence)
    }

    #[test]
    fn agreement_exits_at_round_zero_with_consensus() {
        let mut d = DeliberationState::new(cfg());
        d.sync_claims(&[
            claim("a", "user needs acknowledgement first", "emotion.stress", 2, 2),
            claim("b", "keep the reply short tonight", "social.norms", 1, 2),
        ]);
        match d.plan_next_round() {
            RoundPlan::Exit(ExitReason::Consensus) => {}
            other => panic!("expected consensus exit, got {other:?}"),
        }
        assert!(d.consensus().overall_score >= 0.9);
        assert_eq!(d.rounds_run(), 1);
    }

    #[test]
    fn critical_urgency_exits_immediately() {
        let mut d = DeliberationState::new(cfg());
        d.sync_claims(&[claim("a", "act now", "inhibition.censor", 3, 2)]);
        assert!(matches!(
            d.plan_next_round(),
            RoundPlan::Exit(ExitReason::CriticalUrgency)
        ));
    }

    #[test]
    fn all_deferred_exits_silent() {
        let mut d = DeliberationState::new(cfg());
        d.sync_claims(&[claim("a", "nothing notable", "emotion.stress", 0, 1)]);
        assert!(matches!(
            d.plan_next_round(),
            RoundPlan::Exit(ExitReason::AllDeferred)
        ));
    }

    #[test]
    fn contested_claims_request_followup_from_both_sides() {
        let mut d = DeliberationState::new(cfg());
        let mut opposed = claim("target", "push for a concrete plan", "reasoning.analyst", 2, 2);
        opposed.supports = vec![];
        let mut opposer = Claim::new(
            "counter",
            "plan talk is premature",
            ClaimType::Concern,
            "emotion.attunement",
            2,
            3,
        );
        opposer.opposes.push("target".into());
        d.sync_claims(&[opposed, opposer]);

        // Score: S = 4 + 6 = 10, D = min(2,3)=2 → 0.8; below 0.9, and
        // target's opposition is 6/9 ≈ 0.67 > 0.5, so it is contested.
        match d.plan_next_round() {
            RoundPlan::Followup(agents) => {
                assert_eq!(agents, vec!["emotion.attunement", "reasoning.analyst"]);
            }
            other => panic!("expected followup, got {other:?}"),
        }
        assert_eq!(d.round(), 1);
    }

    #[test]
    fn non_improving_score_converges_after_round_one() {
        let mut d = DeliberationState::new(cfg());
        let base = claim("target", "needs a decision tonight", "reasoning.analyst", 2, 2);
        let mut opposer = Claim::new(
            "counter",
            "decision can wait until morning",
            ClaimType::Concern,
            "planning.short_term",
            2,
            3,
        );
        opposer.opposes.push("target".into());
        // Extra agreeing weight lifts the score above the early-exit
        // threshold while opposition keeps it below full consensus.
        let filler1 = claim("f1", "user energy is low", "resource.energy", 2, 2);
        let filler2 = claim("f2", "tone should stay soft", "social.relationships", 2, 2);
        d.sync_claims(&[base, opposer, filler1, filler2]);

        // S = 18, D = 2 → 0.889: follow-up round requested.
        match d.plan_next_round() {
            RoundPlan::Followup(_) => {}
            other => panic!("expected followup, got {other:?}"),
        }

        // Follow-up added nothing new; same score → converged.
        assert!(matches!(
            d.plan_next_round(),
            RoundPlan::Exit(ExitReason::Converged)
        ));
    }

    #[test]
    fn round_cap_bounds_deliberation() {
        let mut low = cfg();
        low.early_exit_threshold = 0.99;
        low.max_rounds = 2;
        let mut d = DeliberationState::new(low);

        let base = claim("target", "disputed direction", "reasoning.analyst", 2, 2);
        let mut opposer = Claim::new(
            "counter",
            "opposite direction",
            ClaimType::Concern,
            "emotion.stress",
            2,
            3,
        );
        opposer.opposes.push("target".into());
        d.sync_claims(&[base, opposer]);

        match d.plan_next_round() {
            RoundPlan::Followup(_) => {}
            other => panic!("expected followup, got {other:?}"),
        }
        assert!(matches!(
            d.plan_next_round(),
            RoundPlan::Exit(ExitReason::RoundCap)
        ));
    }
}
