//! Voice — renders the council's speech act to natural language through
//! the Model capability.

use std::sync::Arc;

use qm_domain::council::{CouncilDecision, Intent, VoiceResult};
use qm_domain::event::EventPayload;
use qm_domain::model::{ChatMessage, ModelTier};
use qm_providers::{CompletionRequest, ModelProvider};

use crate::clock::Clock;
use crate::emitter::EventEmitter;
use crate::workspace::Workspace;

const SYSTEM_PROMPT: &str = r#"You are the voice of a thoughtful companion. Your responses are:
- Concise (1-3 sentences typically)
- Natural and conversational
- Emotionally attuned, never preachy or lecturing

You receive guidance about WHAT to say (key points) and HOW to say it
(intent, tone, constraints). Follow the guidance in your own voice.

IMPORTANT:
- Don't start with "I" too often
- Vary sentence structure
- If witnessing/acknowledging, do not pivot to advice
"#;

/// Messages of conversation tail included in the voice prompt.
const TAIL_MESSAGES: usize = 3;

pub struct Voice {
    provider: Arc<dyn ModelProvider>,
    clock: Arc<dyn Clock>,
}

impl Voice {
    pub fn new(provider: Arc<dyn ModelProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { provider, clock }
    }

    /// Render the decision. Returns a silent result when the council
    /// chose not to speak; falls back to an intent-keyed sentence when
    /// the model fails.
    pub async fn render(
        &self,
        decision: &CouncilDecision,
        ws_prompt: &VoicePromptInput,
        emitter: &Arc<EventEmitter>,
        turn_id: u64,
        attempt: u32,
        revision_notes: &[String],
    ) -> VoiceResult {
        if !decision.speak {
            return VoiceResult::silent();
        }

        let tier = if decision.escalate {
            ModelTier::Large
        } else {
            ModelTier::Medium
        };
        let prompt = build_prompt(decision, ws_prompt, revision_notes);
        let started = self.clock.monotonic_ms();

        let _ = emitter.emit(
            turn_id,
            EventPayload::ModelCallStarted {
                component: "voice".into(),
                tier,
                model: String::new(),
            },
        );

        let request = CompletionRequest::new(
            vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            tier,
        );

        match self.provider.complete(request).await {
            Ok(response) => {
                let _ = emitter.emit(
                    turn_id,
                    EventPayload::ModelCallCompleted {
                        component: "voice".into(),
                        model: response.model.clone(),
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                        reasoning_tokens: response.reasoning_tokens,
                        latency_ms: response.latency_ms,
                    },
                );
                let text = response.content.trim().to_string();
                let token_count = response.completion_tokens;
                let _ = emitter.emit(
                    turn_id,
                    EventPayload::VoiceRendered {
                        text: text.clone(),
                        intent: decision.speech_act.intent,
                        token_count,
                        attempt,
                    },
                );
                VoiceResult {
                    text,
                    rendered: true,
                    token_count,
                    duration_ms: self.clock.monotonic_ms() - started,
                    model_used: response.model,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "voice render failed; using fallback");
                let text = fallback_text(decision.speech_act.intent).to_string();
                let _ = emitter.emit(
                    turn_id,
                    EventPayload::VoiceRendered {
                        text: text.clone(),
                        intent: decision.speech_act.intent,
                        token_count: 0,
                        attempt,
                    },
                );
                VoiceResult {
                    text,
                    rendered: true,
                    token_count: 0,
                    duration_ms: self.clock.monotonic_ms() - started,
                    model_used: String::new(),
                }
            }
        }
    }
}

/// The workspace-derived slice the voice prompt needs.
pub struct VoicePromptInput {
    pub user_message: String,
    pub tail: Vec<(String, String)>,
}

impl VoicePromptInput {
    pub fn from_workspace(ws: &Workspace) -> Self {
        Self {
            user_message: ws.user_message.clone(),
            tail: ws
                .tail_window(TAIL_MESSAGES)
                .iter()
                .map(|m| (m.role.clone(), m.content.clone()))
                .collect(),
        }
    }
}

fn build_prompt(
    decision: &CouncilDecision,
    input: &VoicePromptInput,
    revision_notes: &[String],
) -> String {
    let act = &decision.speech_act;
    let mut parts = vec![
        "## Context".to_string(),
        format!("User said: \"{}\"", input.user_message),
        String::new(),
        "## Your Response Guidelines".to_string(),
        format!("Intent: {}", act.intent.as_str()),
        format!("Tone: {}", act.tone),
    ];

    if !act.key_points.is_empty() {
        parts.push(String::new());
        parts.push("Key points to address:".into());
        for point in &act.key_points {
            parts.push(format!("- {point}"));
        }
    }

    if !act.do_not.is_empty() {
        parts.push(String::new());
        parts.push("DO NOT:".into());
        for constraint in &act.do_not {
            parts.push(format!("- {constraint}"));
        }
    }

    if !act.asks_user.is_empty() {
        parts.push(String::new());
        parts.push("Consider asking:".into());
        for ask in &act.asks_user {
            parts.push(format!("- {ask}"));
        }
    }

    if !revision_notes.is_empty() {
        parts.push(String::new());
        parts.push("The previous draft was rejected. Fix:".into());
        for note in revision_notes {
            parts.push(format!("- {note}"));
        }
    }

    parts.push(String::new());
    parts.push("## Recent Conversation".into());
    for (role, content) in &input.tail {
        let content: String = content.chars().take(150).collect();
        parts.push(format!("{role}: {content}"));
    }

    parts.push(String::new());
    parts.push("Now write your response (1-3 sentences):".into());
    parts.join("\n")
}

/// Intent-keyed fallback when rendering fails.
pub fn fallback_text(intent: Intent) -> &'static str {
    match intent {
        Intent::Protect => "I'm here for you. Would you like to talk about what's on your mind?",
        Intent::Witness => "I hear you.",
        Intent::Guide => "That's a thoughtful approach.",
        Intent::Clarify => "Could you tell me more?",
        Intent::Celebrate => "That sounds wonderful!",
        Intent::Meta | Intent::Observe | Intent::Boundary => "I'm listening.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use qm_domain::council::{ResponseUrgency, SpeechAct};
    use qm_providers::ScriptedProvider;
    use qm_store::EventLog;

    fn decision(speak: bool, escalate: bool) -> CouncilDecision {
        CouncilDecision {
            speak,
            urgency: ResponseUrgency::Medium,
            speech_act: SpeechAct {
                intent: Intent::Witness,
                tone: "warm".into(),
                key_points: vec!["strain is high".into()],
                do_not: vec!["no premature advice".into()],
                asks_user: vec![],
            },
            escalate,
            deliberation_rounds: 1,
            final_consensus: 1.0,
        }
    }

    fn input() -> VoicePromptInput {
        VoicePromptInput {
            user_message: "I'm feeling really sad today".into(),
            tail: vec![("user".into(), "I'm feeling really sad today".into())],
        }
    }

    fn emitter(clock: Arc<ManualClock>) -> Arc<EventEmitter> {
        Arc::new(EventEmitter::new(Arc::new(EventLog::in_memory("s")), clock))
    }

    #[tokio::test]
    async fn silent_decision_renders_nothing() {
        let clock = Arc::new(ManualClock::new());
        let voice = Voice::new(Arc::new(ScriptedProvider::new()), clock.clone());
        let em = emitter(clock);
        let result = voice
            .render(&decision(false, false), &input(), &em, 1, 1, &[])
            .await;
        assert!(!result.rendered);
        assert!(result.text.is_empty());
        assert!(em.log().replay_turn(1).is_empty());
    }

    #[tokio::test]
    async fn renders_and_emits_voice_event() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(ScriptedProvider::new());
        provider.push("That sounds really heavy today.");
        let voice = Voice::new(provider, clock.clone());
        let em = emitter(clock);

        let result = voice
            .render(&decision(true, false), &input(), &em, 1, 1, &[])
            .await;
        assert!(result.rendered);
        assert_eq!(result.text, "That sounds really heavy today.");

        let events = em.log().replay_turn(1);
        assert!(events
            .iter()
            .any(|e| matches!(&e.payload, EventPayload::VoiceRendered { attempt: 1, .. })));
    }

    #[tokio::test]
    async fn model_failure_uses_intent_fallback() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(ScriptedProvider::with_handler(|_| {
            Err(qm_domain::Error::Other("down".into()))
        }));
        let voice = Voice::new(provider, clock.clone());
        let em = emitter(clock);

        let result = voice
            .render(&decision(true, false), &input(), &em, 1, 1, &[])
            .await;
        assert_eq!(result.text, "I hear you.");
    }

    #[test]
    fn prompt_carries_guidance_and_revisions() {
        let prompt = build_prompt(
            &decision(true, false),
            &input(),
            &["tone was too enthusiastic".to_string()],
        );
        assert!(prompt.contains("Intent: witness"));
        assert!(prompt.contains("- no premature advice"));
        assert!(prompt.contains("tone was too enthusiastic"));
        assert!(prompt.contains("Recent Conversation"));
    }
}
