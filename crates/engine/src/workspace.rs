//! Workspace — the shared blackboard for one session.
//!
//! Agents read an immutable view of it; only the reducer mutates it, and
//! only the turn runner (and daemon, for decay) invokes the reducer.
//! Stance and modulators persist across turns; claims, sensors, and
//! decision slots are transient per turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use qm_domain::claim::Claim;
use qm_domain::config::WorkspaceConfig;
use qm_domain::council::Intent;
use qm_domain::goal::Goal;
use qm_domain::modulators::Modulators;
use qm_domain::sensors::SensorMap;
use qm_domain::stance::{StanceDim, StanceVector};

/// Bounded conversation tail entry. The Session projection is the
/// canonical history; this is a turn-local convenience for prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailMessage {
    pub role: String,
    pub content: String,
}

/// The live shared state for one session.
pub struct Workspace {
    cfg: WorkspaceConfig,

    // ── Context slots (set at turn start) ─────────────────────────
    pub user_message: String,
    pub conversation_tail: Vec<TailMessage>,
    pub open_goals: Vec<Goal>,

    // ── Live state (updated by the reducer) ───────────────────────
    pub stance: StanceVector,
    pub modulators: Modulators,
    pub active_claims: Vec<Claim>,
    pub sensors: SensorMap,
    pub consensus_level: f64,

    // ── Decision slots (set by the council) ───────────────────────
    pub current_goal: Option<Intent>,
    pub constraints: Vec<String>,
    pub pending_asks: Vec<String>,
    pub current_response: Option<String>,

    // ── Bookkeeping ───────────────────────────────────────────────
    pub turn_id: u64,
    /// Monotonic ms of the last user message, for daemon silence checks.
    pub last_user_message_ms: Option<u64>,

    stance_at_turn_start: BTreeMap<StanceDim, f64>,
    modulators_at_turn_start: Modulators,
}

impl Workspace {
    pub fn new(cfg: WorkspaceConfig) -> Self {
        let stance = StanceVector::default();
        let modulators = Modulators::default();
        Self {
            cfg,
            user_message: String::new(),
            conversation_tail: Vec::new(),
            open_goals: Vec::new(),
            stance_at_turn_start: stance.to_map(),
            modulators_at_turn_start: modulators.clone(),
            stance,
            modulators,
            active_claims: Vec::new(),
            sensors: SensorMap::new(),
            consensus_level: 0.0,
            current_goal: None,
            constraints: Vec::new(),
            pending_asks: Vec::new(),
            current_response: None,
            turn_id: 0,
            last_user_message_ms: None,
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.cfg
    }

    // ── Turn lifecycle ────────────────────────────────────────────

    /// Capture the new user message and a stance/modulator baseline for
    /// delta computation and abort rollback.
    pub fn begin_turn(&mut self, user_text: &str, turn_id: u64, now_ms: u64) {
        self.turn_id = turn_id;
        self.user_message = user_text.to_string();
        self.last_user_message_ms = Some(now_ms);
        self.stance_at_turn_start = self.stance.to_map();
        self.modulators_at_turn_start = self.modulators.clone();
        self.push_tail("user", user_text);
    }

    /// Clear transient per-turn state. Stance and modulators persist.
    pub fn reset_for_turn(&mut self) {
        self.active_claims.clear();
        self.sensors.clear();
        self.consensus_level = 0.0;
        self.current_goal = None;
        self.constraints.clear();
        self.pending_asks.clear();
        self.current_response = None;
    }

    /// The single mutating entry for agent proposals; delegates to the
    /// reducer.
    pub fn apply(&mut self, output: &qm_domain::agent::AgentOutput) -> crate::reducer::ReducerOutcome {
        crate::reducer::apply_output(self, output)
    }

    /// Restore stance and modulators to their pre-turn values. Used when
    /// a turn aborts on persistence failure.
    pub fn rollback_turn(&mut self) {
        let start = self.stance_at_turn_start.clone();
        for (dim, value) in start {
            self.stance.set(dim, value);
        }
        self.modulators = self.modulators_at_turn_start.clone();
    }

    /// Stance value captured at `begin_turn`.
    pub fn stance_at_turn_start(&self, dim: StanceDim) -> f64 {
        self.stance_at_turn_start
            .get(&dim)
            .copied()
            .unwrap_or_else(|| self.stance.get(dim))
    }

    /// Per-dimension change since turn start, omitting moves under 0.01.
    pub fn stance_delta_since_turn_start(&self) -> BTreeMap<StanceDim, f64> {
        let mut delta = BTreeMap::new();
        for &dim in &StanceDim::ALL {
            let before = self.stance_at_turn_start(dim);
            let now = self.stance.get(dim);
            if (now - before).abs() > 0.01 {
                delta.insert(dim, now - before);
            }
        }
        delta
    }

    // ── Conversation tail ─────────────────────────────────────────

    pub fn push_tail(&mut self, role: &str, content: &str) {
        self.conversation_tail.push(TailMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
        // Keep a little more than the prompt window so replacement
        // history loads have slack.
        let cap = self.cfg.conversation_window * 3;
        while self.conversation_tail.len() > cap {
            self.conversation_tail.remove(0);
        }
    }

    /// Replace the tail wholesale (from the canonical Session projection).
    pub fn set_tail(&mut self, messages: Vec<TailMessage>) {
        self.conversation_tail = messages;
    }

    /// The last N messages for prompt construction.
    pub fn tail_window(&self, n: usize) -> &[TailMessage] {
        let start = self.conversation_tail.len().saturating_sub(n);
        &self.conversation_tail[start..]
    }

    // ── Prompt context ────────────────────────────────────────────

    /// Render the workspace as context for agent prompts.
    pub fn prompt_context(&self) -> String {
        let mut lines = vec![format!("User message: {}", self.user_message), String::new()];

        lines.push("Recent conversation:".into());
        for msg in self.tail_window(self.cfg.conversation_window) {
            let content: String = msg.content.chars().take(100).collect();
            lines.push(format!("  {}: {}", msg.role, content));
        }

        lines.push(String::new());
        let stance: Vec<String> = self
            .stance
            .to_map()
            .iter()
            .map(|(d, v)| format!("{}={:.2}", d.as_str(), v))
            .collect();
        lines.push(format!("Current stance: {}", stance.join(" ")));
        let mods: Vec<String> = self
            .modulators
            .to_map()
            .iter()
            .map(|(m, v)| format!("{}={:.2}", m.as_str(), v))
            .collect();
        lines.push(format!("Modulators: {}", mods.join(" ")));

        if !self.active_claims.is_empty() {
            lines.push(String::new());
            lines.push(format!("Active claims ({}):", self.active_claims.len()));
            for claim in self.active_claims.iter().take(5) {
                lines.push(format!("  - [{}] {}", claim.claim_type.as_str(), claim.text));
            }
        }

        lines.join("\n")
    }

    // ── Snapshot ──────────────────────────────────────────────────

    /// Marshal the durable part of the workspace for fast recovery.
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "turn_id": self.turn_id,
            "stance": self.stance,
            "modulators": self.modulators,
            "open_goals": self.open_goals,
        })
    }

    /// Restore from a prior [`Workspace::snapshot`]. Unknown or missing
    /// fields keep their defaults.
    pub fn restore(&mut self, snapshot: &Value) {
        if let Some(turn_id) = snapshot.get("turn_id").and_then(Value::as_u64) {
            self.turn_id = turn_id;
        }
        if let Some(stance) = snapshot
            .get("stance")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
        {
            self.stance = stance;
        }
        if let Some(modulators) = snapshot
            .get("modulators")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
        {
            self.modulators = modulators;
        }
        if let Some(goals) = snapshot
            .get("open_goals")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
        {
            self.open_goals = goals;
        }
        self.stance_at_turn_start = self.stance.to_map();
        self.modulators_at_turn_start = self.modulators.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws() -> Workspace {
        Workspace::new(WorkspaceConfig::default())
    }

    #[test]
    fn reset_preserves_stance_and_modulators() {
        let mut w = ws();
        w.stance.set(StanceDim::Strain, 0.6);
        w.modulators.set(qm_domain::modulators::ModulatorName::Arousal, 0.8);
        w.active_claims.push(Claim::new(
            "c1",
            "something",
            qm_domain::claim::ClaimType::Observation,
            "a.b",
            1,
            1,
        ));
        w.current_response = Some("hi".into());

        w.reset_for_turn();

        assert!(w.active_claims.is_empty());
        assert!(w.current_response.is_none());
        assert_eq!(w.stance.strain, 0.6);
        assert_eq!(w.modulators.arousal, 0.8);
    }

    #[test]
    fn rollback_restores_pre_turn_values() {
        let mut w = ws();
        w.begin_turn("hello", 1, 100);
        w.stance.set(StanceDim::Valence, 0.5);
        w.modulators.set(qm_domain::modulators::ModulatorName::SocialRisk, 0.9);

        w.rollback_turn();

        assert_eq!(w.stance.valence, 0.0);
        assert_eq!(w.modulators.social_risk, 0.0);
    }

    #[test]
    fn stance_delta_ignores_tiny_moves() {
        let mut w = ws();
        w.begin_turn("hello", 1, 0);
        w.stance.set(StanceDim::Closeness, w.stance.closeness + 0.005);
        assert!(w.stance_delta_since_turn_start().is_empty());
        w.stance.set(StanceDim::Closeness, w.stance.closeness + 0.05);
        assert!(w
            .stance_delta_since_turn_start()
            .contains_key(&StanceDim::Closeness));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut w = ws();
        w.turn_id = 7;
        w.stance.set(StanceDim::Curiosity, 0.9);
        w.open_goals.push(Goal::new("ship the report"));
        let snap = w.snapshot();

        let mut restored = ws();
        restored.restore(&snap);
        assert_eq!(restored.turn_id, 7);
        assert_eq!(restored.stance.curiosity, 0.9);
        assert_eq!(restored.open_goals.len(), 1);
    }

    #[test]
    fn prompt_context_mentions_user_and_stance() {
        let mut w = ws();
        w.begin_turn("I need help planning", 1, 0);
        let ctx = w.prompt_context();
        assert!(ctx.contains("I need help planning"));
        assert!(ctx.contains("valence="));
        assert!(ctx.contains("time_pressure="));
    }
}
