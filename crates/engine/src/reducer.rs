//! Reducer — the only code that merges an agent proposal into the
//! workspace.
//!
//! Deterministic given the same workspace and output. The runner applies
//! sibling outputs in agent-id lexicographic order, which together with
//! the bounded-delta rules below makes the final workspace state
//! independent of wave-internal completion order.

use std::collections::BTreeMap;

use serde_json::Value;

use qm_domain::agent::AgentOutput;
use qm_domain::claim::{token_jaccard, Claim};
use qm_domain::modulators::ModulatorName;
use qm_domain::stance::StanceDim;

use crate::workspace::Workspace;

/// Agent ids that nudge a modulator when they fire: (modulator, weight,
/// inverse). Inverse nudges move the modulator toward 0.
const MODULATOR_NUDGES: &[(&str, ModulatorName, f64, bool)] = &[
    ("emotion.stress", ModulatorName::Arousal, 0.3, false),
    ("emotion.wellbeing", ModulatorName::Fatigue, 0.3, true),
    ("resource.energy", ModulatorName::Fatigue, 0.2, false),
    ("resource.time", ModulatorName::TimePressure, 0.3, false),
    ("planning.short_term", ModulatorName::TimePressure, 0.2, false),
    ("social.norms", ModulatorName::SocialRisk, 0.3, false),
    ("social.relationships", ModulatorName::SocialRisk, 0.2, false),
    ("inhibition.censor", ModulatorName::SocialRisk, 0.2, false),
];

/// Workspace fields agents may patch.
const PATCHABLE_FIELDS: &[&str] = &["pending_asks", "constraints"];

/// What one application actually changed, so the runner can emit the
/// matching events.
#[derive(Debug, Default)]
pub struct ReducerOutcome {
    /// Post-clamp stance movement caused by this output.
    pub stance_applied: BTreeMap<StanceDim, f64>,
    /// Modulator nudged by this output, if any.
    pub modulator_changed: Option<ModulatorName>,
    pub patch_applied: bool,
    pub claims_added: usize,
    pub claims_merged: usize,
}

impl ReducerOutcome {
    pub fn stance_changed(&self) -> bool {
        !self.stance_applied.is_empty()
    }
}

/// Merge one agent output into the workspace.
pub fn apply_output(ws: &mut Workspace, output: &AgentOutput) -> ReducerOutcome {
    let mut outcome = ReducerOutcome::default();

    for claim in &output.claims {
        if add_claim(ws, claim) {
            outcome.claims_added += 1;
        } else {
            outcome.claims_merged += 1;
        }
    }

    if let Some(delta) = &output.stance_delta {
        outcome.stance_applied = apply_stance_delta(ws, delta);
    }

    if let Some(patch) = &output.workspace_patch {
        outcome.patch_applied = apply_workspace_patch(ws, patch);
    }

    outcome.modulator_changed = nudge_modulator(ws, &output.agent_id, output.urgency);

    outcome
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Claims
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Add a claim with dedup: a same-type claim whose token Jaccard exceeds
/// the configured threshold absorbs the new one (edge union, max urgency
/// and confidence). Returns true when a new claim was appended.
fn add_claim(ws: &mut Workspace, claim: &Claim) -> bool {
    let threshold = ws.config().claim_merge_jaccard;

    for existing in ws.active_claims.iter_mut() {
        if existing.claim_type == claim.claim_type
            && token_jaccard(existing, claim) > threshold
        {
            for s in &claim.supports {
                if !existing.supports.contains(s) {
                    existing.supports.push(s.clone());
                }
            }
            for o in &claim.opposes {
                if !existing.opposes.contains(o) {
                    existing.opposes.push(o.clone());
                }
            }
            existing.urgency = existing.urgency.max(claim.urgency);
            existing.confidence = existing.confidence.max(claim.confidence);
            return false;
        }
    }

    ws.active_claims.push(claim.clone());
    enforce_claim_cap(ws);
    true
}

/// Evict the oldest lowest-weight claim once the cap is exceeded.
fn enforce_claim_cap(ws: &mut Workspace) {
    let cap = ws.config().max_active_claims;
    while ws.active_claims.len() > cap {
        let evict = ws
            .active_claims
            .iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| {
                a.weight()
                    .partial_cmp(&b.weight())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ia.cmp(ib))
            })
            .map(|(i, _)| i);
        if let Some(i) = evict {
            let dropped = ws.active_claims.remove(i);
            tracing::debug!(claim_id = %dropped.id, "evicted low-salience claim at cap");
        } else {
            break;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stance
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Leaky integration: `d' = d·(1-α) + (d + Δ)·α`, with Δ clamped per
/// output and the cumulative per-turn move clamped to the configured
/// maximum from the turn-start value.
fn apply_stance_delta(
    ws: &mut Workspace,
    delta: &BTreeMap<StanceDim, f64>,
) -> BTreeMap<StanceDim, f64> {
    let alpha = ws.config().stance_alpha;
    let max_delta = ws.config().max_stance_delta;
    let mut applied = BTreeMap::new();

    for (&dim, &change) in delta {
        if !change.is_finite() {
            continue;
        }
        let clamped = change.clamp(-max_delta, max_delta);
        let current = ws.stance.get(dim);
        let mut new_value = current * (1.0 - alpha) + (current + clamped) * alpha;

        // Bound the cumulative move for the whole turn.
        let start = ws.stance_at_turn_start(dim);
        new_value = new_value.clamp(start - max_delta, start + max_delta);

        let (lo, hi) = dim.bounds();
        new_value = new_value.clamp(lo, hi);

        if (new_value - current).abs() > f64::EPSILON {
            ws.stance.set(dim, new_value);
            applied.insert(dim, new_value - current);
        }
    }

    if !applied.is_empty() {
        ws.stance.turn_id = ws.turn_id;
    }
    applied
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workspace patch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Only whitelisted list fields are patchable; lists union by identity,
/// every other key is ignored.
fn apply_workspace_patch(ws: &mut Workspace, patch: &Value) -> bool {
    let Some(map) = patch.as_object() else {
        return false;
    };

    let mut any = false;
    for field in PATCHABLE_FIELDS {
        let Some(value) = map.get(*field) else {
            continue;
        };
        let Some(items) = value.as_array() else {
            continue;
        };
        let target = match *field {
            "pending_asks" => &mut ws.pending_asks,
            "constraints" => &mut ws.constraints,
            _ => unreachable!(),
        };
        for item in items {
            if let Some(s) = item.as_str() {
                if !target.iter().any(|existing| existing == s) {
                    target.push(s.to_string());
                    any = true;
                }
            }
        }
    }
    any
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Modulators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Move the mapped modulator by `urgency/3 × weight` (toward 0 when
/// inverse), recording the authoring agent.
fn nudge_modulator(ws: &mut Workspace, agent_id: &str, urgency: u8) -> Option<ModulatorName> {
    let &(_, modulator, weight, inverse) = MODULATOR_NUDGES
        .iter()
        .find(|(id, ..)| *id == agent_id)?;

    if urgency == 0 {
        return None;
    }

    let mut delta = f64::from(urgency) / 3.0 * weight;
    if inverse {
        delta = -delta;
    }

    let current = ws.modulators.get(modulator);
    let new_value = (current + delta).clamp(0.0, 1.0);
    if (new_value - current).abs() < 0.01 {
        return None;
    }

    ws.modulators.set(modulator, new_value);
    ws.modulators
        .source_agents
        .insert(modulator, agent_id.to_string());
    Some(modulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::claim::ClaimType;
    use qm_domain::config::WorkspaceConfig;

    fn ws() -> Workspace {
        let mut w = Workspace::new(WorkspaceConfig::default());
        w.begin_turn("test message", 1, 0);
        w
    }

    fn output_with_delta(agent: &str, dim: StanceDim, delta: f64) -> AgentOutput {
        let mut out = AgentOutput::quiet(agent);
        out.urgency = 1;
        out.salience = 0.1;
        out.stance_delta = Some([(dim, delta)].into_iter().collect());
        out
    }

    #[test]
    fn quiet_output_is_a_noop() {
        let mut w = ws();
        let stance_before = w.stance.to_map();
        let mods_before = w.modulators.to_map();

        let outcome = apply_output(&mut w, &AgentOutput::quiet("emotion.stress"));

        assert!(!outcome.stance_changed());
        assert!(outcome.modulator_changed.is_none());
        assert_eq!(w.stance.to_map(), stance_before);
        assert_eq!(w.modulators.to_map(), mods_before);
        assert!(w.active_claims.is_empty());
    }

    #[test]
    fn stance_delta_uses_leaky_integration() {
        let mut w = ws();
        let before = w.stance.valence;
        apply_output(&mut w, &output_with_delta("reasoning.analyst", StanceDim::Valence, 0.1));
        // d' = d(1-α) + (d+Δ)α with α=0.25 → move of α·Δ = 0.025.
        assert!((w.stance.valence - (before + 0.025)).abs() < 1e-9);
    }

    #[test]
    fn oversized_delta_is_clamped_per_output() {
        let mut w = ws();
        let before = w.stance.valence;
        apply_output(&mut w, &output_with_delta("reasoning.analyst", StanceDim::Valence, 5.0));
        assert!((w.stance.valence - (before + 0.25 * 0.15)).abs() < 1e-9);
    }

    #[test]
    fn cumulative_turn_move_is_bounded() {
        let mut w = ws();
        let start = w.stance.valence;
        for _ in 0..50 {
            apply_output(&mut w, &output_with_delta("reasoning.analyst", StanceDim::Valence, 0.15));
        }
        let max = w.config().max_stance_delta;
        assert!((w.stance.valence - start).abs() <= max + 1e-9);
    }

    #[test]
    fn similar_claims_merge_with_max_levels() {
        let mut w = ws();
        let mut a = AgentOutput::quiet("emotion.stress");
        a.claims
            .push(Claim::new("c1", "user is under heavy load today", ClaimType::Concern, "emotion.stress", 1, 2));
        let mut b = AgentOutput::quiet("monitoring.trigger_watcher");
        b.claims.push(Claim::new(
            "c2",
            "user is under heavy load today",
            ClaimType::Concern,
            "monitoring.trigger_watcher",
            2,
            1,
        ));

        apply_output(&mut w, &a);
        let outcome = apply_output(&mut w, &b);

        assert_eq!(w.active_claims.len(), 1);
        assert_eq!(outcome.claims_merged, 1);
        assert_eq!(w.active_claims[0].urgency, 2);
        assert_eq!(w.active_claims[0].confidence, 2);
    }

    #[test]
    fn different_type_claims_do_not_merge() {
        let mut w = ws();
        let mut a = AgentOutput::quiet("x.y");
        a.claims
            .push(Claim::new("c1", "deadline is close", ClaimType::Observation, "x.y", 1, 1));
        let mut b = AgentOutput::quiet("x.z");
        b.claims
            .push(Claim::new("c2", "deadline is close", ClaimType::Concern, "x.z", 1, 1));

        apply_output(&mut w, &a);
        apply_output(&mut w, &b);
        assert_eq!(w.active_claims.len(), 2);
    }

    #[test]
    fn claim_cap_evicts_lowest_weight() {
        let mut cfg = WorkspaceConfig::default();
        cfg.max_active_claims = 3;
        let mut w = Workspace::new(cfg);
        w.begin_turn("m", 1, 0);

        for (i, (u, c)) in [(1u8, 1u8), (3, 3), (2, 2), (3, 2)].iter().enumerate() {
            let mut out = AgentOutput::quiet(format!("a.{i}"));
            out.claims.push(Claim::new(
                format!("c{i}"),
                format!("claim number {i} entirely distinct text {i}"),
                ClaimType::Observation,
                format!("a.{i}"),
                *u,
                *c,
            ));
            apply_output(&mut w, &out);
        }

        assert_eq!(w.active_claims.len(), 3);
        assert!(w.active_claims.iter().all(|c| c.id != "c0"));
    }

    #[test]
    fn patch_unions_whitelisted_lists_only() {
        let mut w = ws();
        let mut out = AgentOutput::quiet("social.norms");
        out.workspace_patch = Some(serde_json::json!({
            "pending_asks": ["what deadline?", "what deadline?"],
            "constraints": ["keep it short"],
            "stance": {"valence": 1.0},
            "current_response": "injected",
        }));

        let outcome = apply_output(&mut w, &out);

        assert!(outcome.patch_applied);
        assert_eq!(w.pending_asks, vec!["what deadline?"]);
        assert_eq!(w.constraints, vec!["keep it short"]);
        assert!(w.current_response.is_none());
        assert_eq!(w.stance.valence, 0.0);
    }

    #[test]
    fn mapped_agent_nudges_modulator_by_urgency() {
        let mut w = ws();
        let mut out = AgentOutput::quiet("emotion.stress");
        out.urgency = 3;
        let outcome = apply_output(&mut w, &out);

        assert_eq!(outcome.modulator_changed, Some(ModulatorName::Arousal));
        assert!((w.modulators.arousal - 0.6).abs() < 1e-9);
        assert_eq!(
            w.modulators.source_agents[&ModulatorName::Arousal],
            "emotion.stress"
        );
    }

    #[test]
    fn inverse_nudge_moves_toward_zero() {
        let mut w = ws();
        w.modulators.set(ModulatorName::Fatigue, 0.5);
        let mut out = AgentOutput::quiet("emotion.wellbeing");
        out.urgency = 3;
        apply_output(&mut w, &out);
        assert!((w.modulators.fatigue - 0.2).abs() < 1e-9);
    }

    #[test]
    fn sibling_order_invariance_within_wave() {
        // Two permutations of the same outputs, applied in canonical
        // order, must produce identical workspaces.
        let outputs = vec![
            output_with_delta("a.first", StanceDim::Strain, 0.1),
            output_with_delta("b.second", StanceDim::Strain, 0.05),
            output_with_delta("c.third", StanceDim::Valence, -0.1),
        ];

        let run = |perm: Vec<&AgentOutput>| {
            let mut w = ws();
            let mut sorted: Vec<&AgentOutput> = perm;
            sorted.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
            for out in sorted {
                apply_output(&mut w, out);
            }
            w.stance.to_map()
        };

        let forward = run(outputs.iter().collect());
        let backward = run(outputs.iter().rev().collect());
        assert_eq!(forward, backward);
    }
}
