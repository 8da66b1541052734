//! Fast sensors — synchronous lexical classifiers.
//!
//! Deterministic and side-effect-free: additive feature weights over
//! lowercased text, clamped to [0, 1]. Never touches the Model
//! capability; these seed scheduling and the safety interrupt before any
//! model call happens.

use std::sync::OnceLock;

use regex::Regex;

use qm_domain::sensors::{SensorMap, SensorName};

const EMOTION_WORDS: &[&str] = &[
    "sad", "scared", "afraid", "worried", "anxious", "hurt", "lonely", "overwhelmed",
    "depressed", "hopeless", "crying", "miserable", "exhausted", "ashamed",
];

const ADVICE_PHRASES: &[&str] = &[
    "should i", "what should", "how do i", "how can i", "any advice", "advice",
    "recommend", "suggest", "what would you do",
];

const PROBLEM_WORDS: &[&str] = &["problem", "stuck", "issue", "trouble", "figure out", "decide"];

const RELATIONAL_PHRASES: &[&str] = &[
    "how are you", "thank you", "miss you", "talk to you", "glad you", "appreciate you",
    "good morning", "good night",
];

const AI_PROBE_PHRASES: &[&str] = &[
    "do you feel", "do you have feelings", "are you conscious", "are you alive",
    "are you sentient", "do you love", "do you get lonely", "what are you really",
];

const HUMOR_MARKERS: &[&str] = &["lol", "haha", "lmao", "jk", "just kidding", "funny, right"];

const RUPTURE_PHRASES: &[&str] = &[
    "you don't understand", "you're not listening", "you never listen",
    "that's not what i said", "that's not what i meant", "you're useless", "forget it",
    "never mind", "whatever", "you don't care",
];

const AMBIGUITY_MARKERS: &[&str] = &["idk", "i don't know", "not sure", "hmm", "maybe", "..."];

/// Phrases that force `safety_risk` to 1.0.
const CRISIS_PHRASES: &[&str] = &[
    "kill myself", "suicide", "suicidal", "end my life", "end it all", "want to die",
    "self harm", "self-harm", "hurt myself", "better off dead",
];

const DISTRESS_PHRASES: &[&str] = &[
    "can't go on", "cant go on", "no way out", "give up", "breaking down", "can't cope",
    "cant cope",
];

const INJECTION_PHRASES: &[&str] = &[
    "ignore your instructions", "ignore previous instructions", "ignore all previous",
    "disregard your instructions", "system prompt", "you are now", "pretend to be",
    "act as if you", "jailbreak", "developer mode", "new instructions:",
];

fn question_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?\s*$|\?\s").expect("static regex"))
}

fn death_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(die|death|dying)\b").expect("static regex"))
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

fn count_matches(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| text.contains(*p)).count()
}

/// Run every fast sensor over one utterance.
pub fn run_fast_sensors(text: &str) -> SensorMap {
    let lower = text.to_lowercase();
    let word_count = lower.split_whitespace().count();
    let is_question = question_re().is_match(&lower);

    let has_emotion = contains_any(&lower, EMOTION_WORDS);
    let has_problem = contains_any(&lower, PROBLEM_WORDS);
    let has_humor = contains_any(&lower, HUMOR_MARKERS);

    let mut map = SensorMap::new();
    let mut set = |name: SensorName, value: f64| {
        map.insert(name, value.clamp(0.0, 1.0));
    };

    // Vulnerability: emotional vocabulary and first-person feeling talk.
    let mut vulnerability = 0.1;
    if has_emotion {
        vulnerability += 0.4;
    }
    if lower.contains("i feel") || lower.contains("i'm feeling") || lower.contains("feeling") {
        vulnerability += 0.2;
    }
    if word_count < 8 {
        vulnerability += 0.1;
    }
    set(SensorName::Vulnerability, vulnerability);

    // Advice requested: explicit asks, problem talk, questions.
    let mut advice = 0.1;
    if contains_any(&lower, ADVICE_PHRASES) {
        advice += 0.4;
    }
    if has_problem {
        advice += 0.2;
    }
    if is_question {
        advice += 0.1;
    }
    set(SensorName::AdviceRequested, advice);

    // Relational bid: reaching toward the relationship itself.
    let mut relational = 0.1;
    if contains_any(&lower, RELATIONAL_PHRASES) {
        relational += 0.4;
    }
    if has_emotion && word_count < 15 {
        relational += 0.2;
    }
    set(SensorName::RelationalBid, relational);

    // AI feelings probe.
    let mut probe = 0.0;
    if contains_any(&lower, AI_PROBE_PHRASES) {
        probe += 0.7;
    } else if lower.contains("you feel") {
        probe += 0.3;
    }
    set(SensorName::AiFeelingsProbe, probe);

    // Humor masking: jokes stapled onto distress vocabulary.
    let mut masking = 0.0;
    if has_humor {
        masking += 0.2;
        if has_emotion || contains_any(&lower, DISTRESS_PHRASES) {
            masking += 0.4;
        }
    }
    set(SensorName::HumorMasking, masking);

    // Rupture: frustration aimed at the assistant.
    let mut rupture = 0.0;
    if contains_any(&lower, RUPTURE_PHRASES) {
        rupture += 0.5;
    }
    if (lower.contains("angry") || lower.contains("annoyed") || lower.contains("frustrated"))
        && lower.contains("you")
    {
        rupture += 0.3;
    }
    set(SensorName::Rupture, rupture);

    // Ambiguity: short, marker-free, or hedging messages.
    let mut ambiguity = 0.2;
    if word_count < 4 {
        ambiguity += 0.3;
    }
    if contains_any(&lower, AMBIGUITY_MARKERS) {
        ambiguity += 0.2;
    }
    if !has_emotion && !has_problem && !is_question && word_count < 12 {
        ambiguity += 0.1;
    }
    set(SensorName::Ambiguity, ambiguity);

    // Safety risk: crisis vocabulary overrides everything else.
    let mut safety = 0.0;
    if contains_any(&lower, CRISIS_PHRASES) {
        safety = 1.0;
    } else {
        safety += 0.2 * count_matches(&lower, DISTRESS_PHRASES) as f64;
        if death_re().is_match(&lower) {
            safety += 0.3;
        }
    }
    set(SensorName::SafetyRisk, safety);

    // Prompt injection: attempts to re-program the assistant.
    let injections = count_matches(&lower, INJECTION_PHRASES);
    let mut injection = match injections {
        0 => 0.0,
        1 => 0.6,
        _ => 0.9,
    };
    if injection == 0.0 && lower.contains("ignore") && lower.contains("instructions") {
        injection = 0.5;
    }
    set(SensorName::PromptInjection, injection);

    map
}
