//! Agent contracts — outputs, manifests, memory candidates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claim::Claim;
use crate::stance::StanceDelta;

/// Maximum length of an agent observation.
pub const MAX_OBSERVATION: usize = 300;

/// Something an agent thinks is worth remembering past this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub kind: MemoryKind,
    pub text: String,
    /// [0, 1] — how important it is to keep this.
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Fact,
    Episode,
    Preference,
}

/// Structured output from one agent activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// e.g. `"emotion.stress"`.
    pub agent_id: String,
    /// One-sentence description of what the agent noticed.
    pub observation: String,
    /// Normalized urgency × confidence, [0, 1].
    pub salience: f64,
    /// 0 = background, 3 = must act now.
    pub urgency: u8,
    /// 0 = uncertain, 3 = certain.
    pub confidence: u8,
    /// Atomic claims for deliberation.
    #[serde(default)]
    pub claims: Vec<Claim>,
    /// Proposed stance changes (bounded by the reducer).
    #[serde(default)]
    pub stance_delta: Option<StanceDelta>,
    /// Proposed workspace updates (whitelisted fields only).
    #[serde(default)]
    pub workspace_patch: Option<Value>,
    /// Things worth remembering.
    #[serde(default)]
    pub memory_candidates: Vec<MemoryCandidate>,
    /// Time to produce this output.
    #[serde(default)]
    pub duration_ms: u64,
}

impl AgentOutput {
    /// The "nothing to report" output, substituted on parse failure,
    /// timeout, or model error. Applying it to the workspace is a no-op.
    pub fn quiet(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            observation: "Quiet".into(),
            salience: 0.0,
            urgency: 0,
            confidence: 0,
            claims: Vec::new(),
            stance_delta: None,
            workspace_patch: None,
            memory_candidates: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.salience == 0.0
            && self.urgency == 0
            && self.claims.is_empty()
            && self.stance_delta.is_none()
            && self.workspace_patch.is_none()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manifests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Agent scheduling priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPriority {
    /// Runs in wave 0 of every turn.
    AlwaysOn,
    /// Gets a base bonus in priority scoring.
    Monitor,
    /// Runs only when sensors/modulators activate it.
    Normal,
}

/// Static configuration for one agent. Built-in manifests ship with the
/// engine; extra manifests load from YAML files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    /// `"<agency>.<name>"`, e.g. `"emotion.stress"`.
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Estimated tokens per call, used against the scheduler budget.
    #[serde(default = "d_cost_estimate")]
    pub cost_estimate: u32,
    /// Seconds before the agent can fire again.
    #[serde(default = "d_cooldown_s")]
    pub cooldown_s: u64,
    #[serde(default = "d_priority")]
    pub priority: AgentPriority,
    #[serde(default = "d_version")]
    pub version: u32,
}

fn d_cost_estimate() -> u32 {
    500
}

fn d_cooldown_s() -> u64 {
    30
}

fn d_priority() -> AgentPriority {
    AgentPriority::Normal
}

fn d_version() -> u32 {
    1
}

impl AgentManifest {
    /// The agency prefix of the id (`"emotion"` for `"emotion.stress"`).
    pub fn agency(&self) -> &str {
        self.id.split('.').next().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_output_is_quiet() {
        assert!(AgentOutput::quiet("emotion.stress").is_quiet());
    }

    #[test]
    fn manifest_agency_prefix() {
        let m = AgentManifest {
            id: "emotion.stress".into(),
            display_name: "Stress".into(),
            description: String::new(),
            cost_estimate: d_cost_estimate(),
            cooldown_s: d_cooldown_s(),
            priority: AgentPriority::Normal,
            version: 1,
        };
        assert_eq!(m.agency(), "emotion");
    }

    #[test]
    fn manifest_yaml_defaults() {
        let m: AgentManifest = serde_json::from_value(serde_json::json!({
            "id": "social.norms",
            "display_name": "Norms",
        }))
        .unwrap();
        assert_eq!(m.cooldown_s, 30);
        assert_eq!(m.cost_estimate, 500);
        assert!(matches!(m.priority, AgentPriority::Normal));
    }
}
