//! Debug projection — per-agent traces, stage timing, error history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qm_domain::event::{Event, EventPayload, TurnStage};

use super::Projection;

/// Trace of a single agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrace {
    pub agent_id: String,
    pub turn_id: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub observation: String,
    pub salience: f64,
    pub urgency: u8,
    pub confidence: u8,
    pub claim_count: u32,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AgentTrace {
    fn pending(agent_id: String, turn_id: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            turn_id,
            started_at: Some(started_at),
            completed_at: None,
            observation: String::new(),
            salience: 0.0,
            urgency: 0,
            confidence: 0,
            claim_count: 0,
            error: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub turn_id: u64,
    pub message: String,
    pub stage: Option<TurnStage>,
    pub timestamp: DateTime<Utc>,
}

/// What every agent did and when, per turn.
#[derive(Debug, Default)]
pub struct DebugProjection {
    /// turn_id → completed traces, in completion order.
    pub turn_traces: BTreeMap<u64, Vec<AgentTrace>>,
    /// Started but not yet completed, keyed by agent id.
    pending: BTreeMap<String, AgentTrace>,
    /// turn_id → stage → monotonic ms when entered.
    pub stage_timing: BTreeMap<u64, BTreeMap<TurnStage, u64>>,
    pub errors: Vec<ErrorRecord>,
}

impl Projection for DebugProjection {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply(&mut self, event: &Event) {
        let turn_id = event.turn_id;
        match &event.payload {
            EventPayload::TurnStarted { .. } => {
                self.turn_traces.entry(turn_id).or_default();
                self.stage_timing.entry(turn_id).or_default();
            }
            EventPayload::TurnStageChanged { stage } => {
                self.stage_timing
                    .entry(turn_id)
                    .or_default()
                    .insert(*stage, event.ts_monotonic_ms);
            }
            EventPayload::AgentStarted { agent_id } => {
                self.pending.insert(
                    agent_id.clone(),
                    AgentTrace::pending(agent_id.clone(), turn_id, event.ts_wall),
                );
            }
            EventPayload::AgentCompleted {
                agent_id,
                observation,
                salience,
                urgency,
                confidence,
                claim_count,
                duration_ms,
            } => {
                let mut trace = self
                    .pending
                    .remove(agent_id)
                    .unwrap_or_else(|| AgentTrace::pending(agent_id.clone(), turn_id, event.ts_wall));
                trace.completed_at = Some(event.ts_wall);
                trace.observation = observation.clone();
                trace.salience = *salience;
                trace.urgency = *urgency;
                trace.confidence = *confidence;
                trace.claim_count = *claim_count;
                trace.duration_ms = *duration_ms;
                self.turn_traces.entry(turn_id).or_default().push(trace);
            }
            EventPayload::AgentFailed { agent_id, reason } => {
                let mut trace = self
                    .pending
                    .remove(agent_id)
                    .unwrap_or_else(|| AgentTrace::pending(agent_id.clone(), turn_id, event.ts_wall));
                trace.completed_at = Some(event.ts_wall);
                trace.error = Some(reason.clone());
                self.turn_traces.entry(turn_id).or_default().push(trace);
            }
            EventPayload::Error { message, stage } => {
                self.errors.push(ErrorRecord {
                    turn_id,
                    message: message.clone(),
                    stage: *stage,
                    timestamp: event.ts_wall,
                });
            }
            _ => {}
        }
    }
}

impl DebugProjection {
    /// Traces for one turn, empty slice if the turn never ran.
    pub fn traces_for(&self, turn_id: u64) -> &[AgentTrace] {
        self.turn_traces
            .get(&turn_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn errors_for(&self, turn_id: u64) -> Vec<&ErrorRecord> {
        self.errors.iter().filter(|e| e.turn_id == turn_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::event::SCHEMA_VERSION;

    fn ev(turn: u64, seq: u64, payload: EventPayload) -> Event {
        Event {
            session_id: "s".into(),
            turn_id: turn,
            seq,
            ts_monotonic_ms: seq * 10,
            ts_wall: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload,
        }
    }

    #[test]
    fn pairs_started_with_completed() {
        let mut p = DebugProjection::default();
        p.apply(&ev(1, 0, EventPayload::TurnStarted { user_input: "x".into() }));
        p.apply(&ev(1, 1, EventPayload::AgentStarted { agent_id: "a.b".into() }));
        p.apply(&ev(
            1,
            2,
            EventPayload::AgentCompleted {
                agent_id: "a.b".into(),
                observation: "saw something".into(),
                salience: 0.5,
                urgency: 1,
                confidence: 2,
                claim_count: 1,
                duration_ms: 30,
            },
        ));

        let traces = p.traces_for(1);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].observation, "saw something");
        assert!(traces[0].error.is_none());
    }

    #[test]
    fn failure_recorded_as_trace_with_error() {
        let mut p = DebugProjection::default();
        p.apply(&ev(1, 0, EventPayload::AgentStarted { agent_id: "a.b".into() }));
        p.apply(&ev(
            1,
            1,
            EventPayload::AgentFailed {
                agent_id: "a.b".into(),
                reason: "timeout".into(),
            },
        ));
        let traces = p.traces_for(1);
        assert_eq!(traces[0].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn stage_timing_keyed_by_stage() {
        let mut p = DebugProjection::default();
        p.apply(&ev(1, 0, EventPayload::TurnStarted { user_input: "x".into() }));
        p.apply(&ev(
            1,
            1,
            EventPayload::TurnStageChanged { stage: TurnStage::SensingFast },
        ));
        assert_eq!(p.stage_timing[&1][&TurnStage::SensingFast], 10);
    }
}
