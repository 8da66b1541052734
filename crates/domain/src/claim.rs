//! Claims — the currency of deliberation.

use serde::{Deserialize, Serialize};

/// Maximum length of a claim text, enforced on construction.
pub const MAX_CLAIM_TEXT: usize = 200;

/// What kind of statement an agent is making.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// What the agent noticed.
    Observation,
    /// What the agent suggests doing.
    Recommendation,
    /// What worries the agent.
    Concern,
    /// What the agent wants to know.
    Question,
}

impl ClaimType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Recommendation => "recommendation",
            Self::Concern => "concern",
            Self::Question => "question",
        }
    }
}

/// An atomic statement from an agent. Claims can support or oppose other
/// claims by id, forming the turn's argument graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Stable within a turn (short random id assigned at parse time).
    pub id: String,
    /// Atomic statement, truncated to [`MAX_CLAIM_TEXT`].
    pub text: String,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    /// Agent that made this claim.
    pub source_agent: String,
    /// 0 = background, 3 = must act now.
    pub urgency: u8,
    /// 0 = uncertain, 3 = certain.
    pub confidence: u8,
    /// Ids of claims this one supports.
    #[serde(default)]
    pub supports: Vec<String>,
    /// Ids of claims this one opposes.
    #[serde(default)]
    pub opposes: Vec<String>,
}

impl Claim {
    /// Build a claim, clamping urgency/confidence to 0..=3 and truncating
    /// over-long text at a char boundary.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        claim_type: ClaimType,
        source_agent: impl Into<String>,
        urgency: u8,
        confidence: u8,
    ) -> Self {
        let mut text = text.into();
        if text.chars().count() > MAX_CLAIM_TEXT {
            text = text.chars().take(MAX_CLAIM_TEXT).collect();
        }
        Self {
            id: id.into(),
            text,
            claim_type,
            source_agent: source_agent.into(),
            urgency: urgency.min(3),
            confidence: confidence.min(3),
            supports: Vec::new(),
            opposes: Vec::new(),
        }
    }

    /// Normalized urgency × confidence in [0, 1].
    pub fn weight(&self) -> f64 {
        f64::from(self.urgency) * f64::from(self.confidence) / 9.0
    }

    /// Lowercased token set for merge similarity checks.
    pub fn tokens(&self) -> std::collections::BTreeSet<String> {
        self.text
            .to_lowercase()
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }
}

/// Jaccard overlap on lowercased tokens; used for claim merging.
pub fn token_jaccard(a: &Claim, b: &Claim) -> f64 {
    let ta = a.tokens();
    let tb = b.tokens();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let overlap = ta.intersection(&tb).count();
    let total = ta.union(&tb).count();
    overlap as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_urgency_and_confidence() {
        let c = Claim::new("a", "text", ClaimType::Observation, "agent", 9, 7);
        assert_eq!(c.urgency, 3);
        assert_eq!(c.confidence, 3);
    }

    #[test]
    fn truncates_long_text() {
        let long = "x".repeat(500);
        let c = Claim::new("a", long, ClaimType::Concern, "agent", 1, 1);
        assert_eq!(c.text.chars().count(), MAX_CLAIM_TEXT);
    }

    #[test]
    fn jaccard_identical_text() {
        let a = Claim::new("a", "user is feeling sad today", ClaimType::Observation, "x", 1, 1);
        let b = Claim::new("b", "User is feeling SAD today", ClaimType::Observation, "y", 2, 2);
        assert!(token_jaccard(&a, &b) > 0.99);
    }

    #[test]
    fn jaccard_disjoint_text() {
        let a = Claim::new("a", "deadline pressure rising", ClaimType::Concern, "x", 1, 1);
        let b = Claim::new("b", "user celebrated good news", ClaimType::Observation, "y", 1, 1);
        assert_eq!(token_jaccard(&a, &b), 0.0);
    }
}
