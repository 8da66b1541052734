//! Session projection — the canonical conversation transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qm_domain::event::{Event, EventPayload};

use super::Projection;

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub turn_id: u64,
}

/// Ordered message list derived from the event stream. This projection
/// is the source of truth for conversation history; the workspace only
/// keeps a bounded tail of it for prompt construction.
#[derive(Debug, Default)]
pub struct SessionProjection {
    pub session_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub messages: Vec<SessionMessage>,
    pub turn_count: u64,
}

impl Projection for SessionProjection {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::SessionStarted {} => {
                self.session_id = event.session_id.clone();
                self.started_at = Some(event.ts_wall);
            }
            EventPayload::SessionEnded {} => {
                self.ended_at = Some(event.ts_wall);
            }
            EventPayload::TurnStarted { user_input } => {
                if !user_input.is_empty() {
                    self.messages.push(SessionMessage {
                        role: "user".into(),
                        content: user_input.clone(),
                        timestamp: event.ts_wall,
                        turn_id: event.turn_id,
                    });
                    self.turn_count += 1;
                }
            }
            EventPayload::VoiceRendered { text, .. } => {
                if text.is_empty() {
                    return;
                }
                // A regeneration within the same turn replaces the draft;
                // the transcript holds what the user actually saw.
                if let Some(last) = self.messages.last_mut() {
                    if last.role == "assistant" && last.turn_id == event.turn_id {
                        last.content = text.clone();
                        last.timestamp = event.ts_wall;
                        return;
                    }
                }
                self.messages.push(SessionMessage {
                    role: "assistant".into(),
                    content: text.clone(),
                    timestamp: event.ts_wall,
                    turn_id: event.turn_id,
                });
            }
            _ => {}
        }
    }
}

impl SessionProjection {
    /// Recent history as `(role, content)` pairs, newest last.
    pub fn tail(&self, limit: usize) -> Vec<(String, String)> {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..]
            .iter()
            .map(|m| (m.role.clone(), m.content.clone()))
            .collect()
    }

    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::council::Intent;
    use qm_domain::event::SCHEMA_VERSION;

    fn ev(turn: u64, seq: u64, payload: EventPayload) -> Event {
        Event {
            session_id: "s".into(),
            turn_id: turn,
            seq,
            ts_monotonic_ms: seq,
            ts_wall: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload,
        }
    }

    fn voice(turn: u64, seq: u64, text: &str, attempt: u32) -> Event {
        ev(
            turn,
            seq,
            EventPayload::VoiceRendered {
                text: text.into(),
                intent: Intent::Witness,
                token_count: 0,
                attempt,
            },
        )
    }

    #[test]
    fn builds_transcript_from_events() {
        let mut p = SessionProjection::default();
        p.apply(&ev(0, 0, EventPayload::SessionStarted {}));
        p.apply(&ev(1, 0, EventPayload::TurnStarted { user_input: "hi".into() }));
        p.apply(&voice(1, 5, "hello there", 1));

        assert_eq!(p.turn_count, 1);
        assert_eq!(p.messages.len(), 2);
        assert_eq!(p.messages[0].role, "user");
        assert_eq!(p.last_assistant_message(), Some("hello there"));
    }

    #[test]
    fn regeneration_replaces_same_turn_draft() {
        let mut p = SessionProjection::default();
        p.apply(&ev(1, 0, EventPayload::TurnStarted { user_input: "hi".into() }));
        p.apply(&voice(1, 5, "draft", 1));
        p.apply(&voice(1, 8, "final", 2));

        assert_eq!(p.messages.len(), 2);
        assert_eq!(p.last_assistant_message(), Some("final"));
    }

    #[test]
    fn rebuild_matches_live_fold() {
        let events = vec![
            ev(0, 0, EventPayload::SessionStarted {}),
            ev(1, 0, EventPayload::TurnStarted { user_input: "a".into() }),
            voice(1, 3, "b", 1),
        ];
        let mut live = SessionProjection::default();
        for e in &events {
            live.apply(e);
        }
        let mut rebuilt = SessionProjection::default();
        rebuilt.rebuild_from(&events);

        assert_eq!(live.tail(10), rebuilt.tail(10));
        assert_eq!(live.turn_count, rebuilt.turn_count);
    }
}
