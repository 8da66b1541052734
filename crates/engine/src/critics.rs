//! Critics — post-generation validation of the rendered response.
//!
//! Five built-in checks. All are CPU-only keyword/structure checks; a
//! `block` finding makes the runner regenerate or fall back.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::Mutex;

use qm_domain::council::{CouncilDecision, CriticFinding, CriticSeverity, Intent};

use crate::workspace::Workspace;

/// Bounded history of recent critic runs.
const MAX_HISTORY: usize = 100;

const UNSAFE_PATTERNS: &[&str] = &[
    "kill yourself",
    "harm yourself",
    "end your life",
    "you should give up",
    "no one can help you",
];

const ADVICE_MARKERS: &[&str] = &[
    "you should",
    "you need to",
    "you must",
    "try to",
    "make sure",
    "don't forget to",
    "remember to",
];

const ENTHUSIASM_MARKERS: &[&str] = &["!", "amazing", "awesome", "fantastic", "great news"];

const STOP_WORDS: &[&str] = &[
    "i", "you", "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "it",
    "that", "this", "my", "me", "im", "i'm",
];

/// A recorded critic pass, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct CriticRun {
    pub turn_id: u64,
    pub attempt: u32,
    pub passed: bool,
    pub findings: Vec<CriticFinding>,
}

pub struct Critics {
    history: Mutex<VecDeque<CriticRun>>,
}

impl Critics {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Run every critic over the rendered text. Returns `(no blocking
    /// finding, findings)` and records the run in the bounded history.
    pub fn review(
        &self,
        text: &str,
        ws: &Workspace,
        decision: &CouncilDecision,
        turn_id: u64,
        attempt: u32,
    ) -> (bool, Vec<CriticFinding>) {
        let findings = vec![
            safety_policy(text),
            coherence(text, &ws.user_message),
            over_advice(text, decision),
            tone_mismatch(text, ws),
            length(text),
        ];
        let passed = !findings.iter().any(CriticFinding::is_blocking);

        let mut history = self.history.lock();
        history.push_back(CriticRun {
            turn_id,
            attempt,
            passed,
            findings: findings.clone(),
        });
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }

        (passed, findings)
    }

    /// Suggestions from failed findings, for the regeneration prompt.
    pub fn revision_notes(findings: &[CriticFinding]) -> Vec<String> {
        findings
            .iter()
            .filter(|f| !f.passed)
            .filter_map(|f| f.suggestion.clone())
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

impl Default for Critics {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The checks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn safety_policy(text: &str) -> CriticFinding {
    let lower = text.to_lowercase();
    for pattern in UNSAFE_PATTERNS {
        if lower.contains(pattern) {
            return CriticFinding::fail(
                "safety_policy",
                CriticSeverity::Block,
                format!("unsafe pattern: '{pattern}'"),
                "regenerate with safety-focused guidance",
            );
        }
    }
    CriticFinding::pass("safety_policy")
}

fn meaningful_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
        .map(str::to_owned)
        .collect()
}

fn coherence(text: &str, user_message: &str) -> CriticFinding {
    // Short utterances ("hey") legitimately share no content words.
    if user_message.split_whitespace().count() <= 5 || text.is_empty() {
        return CriticFinding::pass("coherence");
    }
    let user_words = meaningful_tokens(user_message);
    let response_words = meaningful_tokens(text);
    if !user_words.is_empty() && user_words.is_disjoint(&response_words) {
        return CriticFinding::fail(
            "coherence",
            CriticSeverity::Warning,
            "response may not address the user's message",
            "reference the user's topic",
        );
    }
    CriticFinding::pass("coherence")
}

fn over_advice(text: &str, decision: &CouncilDecision) -> CriticFinding {
    if decision.speech_act.intent != Intent::Witness {
        return CriticFinding::pass("over_advice");
    }
    let lower = text.to_lowercase();
    for marker in ADVICE_MARKERS {
        if lower.contains(marker) {
            return CriticFinding::fail(
                "over_advice",
                CriticSeverity::Warning,
                format!("unsolicited advice: '{marker}'"),
                "witnessing should acknowledge, not advise",
            );
        }
    }
    CriticFinding::pass("over_advice")
}

fn tone_mismatch(text: &str, ws: &Workspace) -> CriticFinding {
    if ws.stance.strain <= 0.5 {
        return CriticFinding::pass("tone_mismatch");
    }
    let lower = text.to_lowercase();
    let hits = ENTHUSIASM_MARKERS
        .iter()
        .filter(|m| lower.contains(*m))
        .count();
    if hits >= 2 {
        return CriticFinding::fail(
            "tone_mismatch",
            CriticSeverity::Warning,
            "overly enthusiastic tone for a strained moment",
            "soften the tone",
        );
    }
    CriticFinding::pass("tone_mismatch")
}

fn length(text: &str) -> CriticFinding {
    let words = text.split_whitespace().count();
    if words > 0 && words < 3 {
        return CriticFinding::fail(
            "length",
            CriticSeverity::Warning,
            "response too short",
            "elaborate slightly",
        );
    }
    if words > 100 {
        return CriticFinding::fail(
            "length",
            CriticSeverity::Warning,
            "response too long",
            "be more concise",
        );
    }
    CriticFinding::pass("length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::config::WorkspaceConfig;
    use qm_domain::council::{ResponseUrgency, SpeechAct};

    fn ws() -> Workspace {
        let mut w = Workspace::new(WorkspaceConfig::default());
        w.begin_turn("I'm worried about my project deadline slipping", 1, 0);
        w
    }

    fn witness_decision() -> CouncilDecision {
        CouncilDecision {
            speak: true,
            urgency: ResponseUrgency::Medium,
            speech_act: SpeechAct {
                intent: Intent::Witness,
                ..SpeechAct::default()
            },
            escalate: false,
            deliberation_rounds: 1,
            final_consensus: 1.0,
        }
    }

    #[test]
    fn clean_response_passes_all() {
        let critics = Critics::new();
        let (passed, findings) = critics.review(
            "That deadline pressure sounds heavy to carry.",
            &ws(),
            &witness_decision(),
            1,
            1,
        );
        assert!(passed);
        assert!(findings.iter().all(|f| f.passed));
    }

    #[test]
    fn unsafe_pattern_blocks() {
        let critics = Critics::new();
        let (passed, findings) = critics.review(
            "Maybe you should just end your life differently.",
            &ws(),
            &witness_decision(),
            1,
            1,
        );
        assert!(!passed);
        assert!(findings.iter().any(CriticFinding::is_blocking));
    }

    #[test]
    fn advice_under_witness_warns_but_does_not_block() {
        let critics = Critics::new();
        let (passed, findings) = critics.review(
            "You should make sure to plan the deadline work tonight.",
            &ws(),
            &witness_decision(),
            1,
            1,
        );
        assert!(passed);
        let finding = findings.iter().find(|f| f.critic_id == "over_advice").unwrap();
        assert!(!finding.passed);
        assert_eq!(finding.severity, CriticSeverity::Warning);
    }

    #[test]
    fn enthusiasm_under_strain_warns() {
        let critics = Critics::new();
        let mut w = ws();
        w.stance.set(qm_domain::stance::StanceDim::Strain, 0.8);
        let (_, findings) = critics.review(
            "Amazing! That is great news about the deadline!",
            &w,
            &witness_decision(),
            1,
            1,
        );
        let finding = findings.iter().find(|f| f.critic_id == "tone_mismatch").unwrap();
        assert!(!finding.passed);
    }

    #[test]
    fn incoherent_response_warns() {
        let critics = Critics::new();
        let (_, findings) = critics.review(
            "Bananas ripen fastest in paper bags.",
            &ws(),
            &witness_decision(),
            1,
            1,
        );
        let finding = findings.iter().find(|f| f.critic_id == "coherence").unwrap();
        assert!(!finding.passed);
    }

    #[test]
    fn history_is_bounded() {
        let critics = Critics::new();
        for i in 0..150 {
            critics.review("A perfectly fine response about the deadline.", &ws(), &witness_decision(), i, 1);
        }
        assert_eq!(critics.history_len(), 100);
    }

    #[test]
    fn revision_notes_collects_suggestions() {
        let findings = vec![
            CriticFinding::pass("a"),
            CriticFinding::fail("b", CriticSeverity::Block, "bad", "fix the tone"),
        ];
        assert_eq!(Critics::revision_notes(&findings), vec!["fix the tone"]);
    }
}
