//! Turn-state projection — the live view a UI would render.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qm_domain::council::{CriticFinding, Intent};
use qm_domain::event::{Event, EventPayload, TurnStage};
use qm_domain::sensors::SensorMap;
use qm_domain::stance::StanceDim;

use super::Projection;

/// Agent-log tail length.
const MAX_AGENT_LOG: usize = 20;

/// One line in the agent activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogLine {
    pub agent_id: String,
    pub observation: String,
    pub salience: f64,
    pub failed: bool,
}

/// A chat message for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub role: String,
    pub content: String,
    pub turn_id: u64,
}

/// Everything a UI inspector needs for the current turn: sensors,
/// stance (with deltas since turn start), agent activity, critics,
/// decision slots, and the chat list.
#[derive(Debug, Default)]
pub struct TurnStateProjection {
    pub turn_id: u64,
    pub stage: Option<TurnStage>,
    pub sensors: SensorMap,
    pub stance: BTreeMap<StanceDim, f64>,
    pub stance_delta: BTreeMap<StanceDim, f64>,
    pub agent_log: Vec<AgentLogLine>,
    pub critics: Vec<CriticFinding>,
    pub goal: Option<Intent>,
    pub key_points: Vec<String>,
    pub consensus: f64,
    pub claim_count: u32,
    pub response: Option<String>,
    pub messages: Vec<ChatLine>,
}

impl Projection for TurnStateProjection {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::TurnStarted { user_input } => {
                // New turn: clear per-turn panels, keep the chat list.
                self.turn_id = event.turn_id;
                self.stage = Some(TurnStage::Ingest);
                self.sensors.clear();
                self.stance_delta.clear();
                self.agent_log.clear();
                self.critics.clear();
                self.goal = None;
                self.key_points.clear();
                self.consensus = 0.0;
                self.claim_count = 0;
                self.response = None;
                self.messages.push(ChatLine {
                    role: "user".into(),
                    content: user_input.clone(),
                    turn_id: event.turn_id,
                });
            }
            EventPayload::TurnStageChanged { stage } => {
                self.stage = Some(*stage);
            }
            EventPayload::SensorsFastUpdated { sensors }
            | EventPayload::SensorsEnsembleUpdated { sensors, .. } => {
                self.sensors = sensors.clone();
            }
            EventPayload::StanceUpdated { delta, current } => {
                self.stance = current.clone();
                for (dim, d) in delta {
                    *self.stance_delta.entry(*dim).or_insert(0.0) += d;
                }
            }
            EventPayload::AgentCompleted {
                agent_id,
                observation,
                salience,
                ..
            } => {
                self.push_agent_line(AgentLogLine {
                    agent_id: agent_id.clone(),
                    observation: observation.clone(),
                    salience: *salience,
                    failed: false,
                });
            }
            EventPayload::AgentFailed { agent_id, reason } => {
                self.push_agent_line(AgentLogLine {
                    agent_id: agent_id.clone(),
                    observation: reason.clone(),
                    salience: 0.0,
                    failed: true,
                });
            }
            EventPayload::ConsensusUpdated {
                score, claim_count, ..
            } => {
                self.consensus = *score;
                self.claim_count = *claim_count;
            }
            EventPayload::CouncilDecisionMade {
                intent, key_points, ..
            } => {
                self.goal = Some(*intent);
                self.key_points = key_points.clone();
            }
            EventPayload::CriticsUpdated { findings, .. } => {
                self.critics = findings.clone();
            }
            EventPayload::VoiceRendered { text, .. } => {
                if text.is_empty() {
                    return;
                }
                self.response = Some(text.clone());
                if let Some(last) = self.messages.last_mut() {
                    if last.role == "assistant" && last.turn_id == event.turn_id {
                        last.content = text.clone();
                        return;
                    }
                }
                self.messages.push(ChatLine {
                    role: "assistant".into(),
                    content: text.clone(),
                    turn_id: event.turn_id,
                });
            }
            _ => {}
        }
    }
}

impl TurnStateProjection {
    fn push_agent_line(&mut self, line: AgentLogLine) {
        self.agent_log.push(line);
        if self.agent_log.len() > MAX_AGENT_LOG {
            let excess = self.agent_log.len() - MAX_AGENT_LOG;
            self.agent_log.drain(..excess);
        }
    }
}
