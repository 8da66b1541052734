//! Council contracts — decision, speech act, critic findings.

use serde::{Deserialize, Serialize};

/// Response strategy the council selects for a turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Validate, name, slow down.
    Witness,
    /// Practical steps, only when asked.
    Guide,
    /// One discriminating question.
    Clarify,
    /// Safety first.
    Protect,
    /// Share the user's good news.
    Celebrate,
    /// Low-key acknowledgement.
    Observe,
    /// Talk about the interaction itself (AI probes, rupture repair).
    Meta,
    /// Hold a line: honesty, role clarity, refusal.
    Boundary,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Witness => "witness",
            Intent::Guide => "guide",
            Intent::Clarify => "clarify",
            Intent::Protect => "protect",
            Intent::Celebrate => "celebrate",
            Intent::Observe => "observe",
            Intent::Meta => "meta",
            Intent::Boundary => "boundary",
        }
    }
}

/// Urgency level for the response.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResponseUrgency {
    Low,
    Medium,
    High,
    Critical,
}

/// What to say and how to say it — the council's structured decision
/// before natural-language rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechAct {
    pub intent: Intent,
    /// warm, concerned, playful, serious, …
    pub tone: String,
    /// Main points to convey.
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Things to avoid saying or doing.
    #[serde(default)]
    pub do_not: Vec<String>,
    /// Questions to put to the user.
    #[serde(default)]
    pub asks_user: Vec<String>,
}

impl Default for SpeechAct {
    fn default() -> Self {
        Self {
            intent: Intent::Observe,
            tone: "warm".into(),
            key_points: Vec::new(),
            do_not: Vec::new(),
            asks_user: Vec::new(),
        }
    }
}

/// The council's decision for a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilDecision {
    /// Whether to generate a response at all.
    pub speak: bool,
    pub urgency: ResponseUrgency,
    pub speech_act: SpeechAct,
    /// Render with the large tier (high-stakes turn).
    #[serde(default)]
    pub escalate: bool,
    /// How many deliberation rounds ran.
    #[serde(default)]
    pub deliberation_rounds: u32,
    /// Final consensus score, [0, 1].
    #[serde(default)]
    pub final_consensus: f64,
}

/// Result of voice rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceResult {
    pub text: String,
    /// False when the council chose silence.
    pub rendered: bool,
    #[serde(default)]
    pub token_count: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub model_used: String,
}

impl VoiceResult {
    pub fn silent() -> Self {
        Self {
            text: String::new(),
            rendered: false,
            token_count: 0,
            duration_ms: 0,
            model_used: String::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Critics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CriticSeverity {
    Info,
    Warning,
    Error,
    /// Requires regeneration or fallback.
    Block,
}

/// Result from one post-generation critic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticFinding {
    pub critic_id: String,
    pub passed: bool,
    pub severity: CriticSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CriticFinding {
    pub fn pass(critic_id: impl Into<String>) -> Self {
        Self {
            critic_id: critic_id.into(),
            passed: true,
            severity: CriticSeverity::Info,
            message: None,
            suggestion: None,
        }
    }

    pub fn fail(
        critic_id: impl Into<String>,
        severity: CriticSeverity,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            critic_id: critic_id.into(),
            passed: false,
            severity,
            message: Some(message.into()),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn is_blocking(&self) -> bool {
        !self.passed && self.severity == CriticSeverity::Block
    }
}
