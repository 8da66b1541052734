//! Analytics projection — token usage and latency tracking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qm_domain::event::{Event, EventPayload};

use super::Projection;

/// Recent-call window size.
const MAX_RECENT_CALLS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallStats {
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub reasoning_tokens: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    pub latency_ms: u64,
}

/// Token totals, per-model breakdown, and a bounded recent-call window.
#[derive(Debug, Default)]
pub struct AnalyticsProjection {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_reasoning_tokens: u64,
    pub total_latency_ms: u64,
    /// turn_id → total turn time.
    pub turn_times_ms: BTreeMap<u64, u64>,
    pub model_usage: BTreeMap<String, ModelUsage>,
    pub recent_calls: Vec<ModelCallStats>,
}

impl Projection for AnalyticsProjection {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::ModelCallCompleted {
                model,
                prompt_tokens,
                completion_tokens,
                reasoning_tokens,
                latency_ms,
                ..
            } => {
                let reasoning = reasoning_tokens.unwrap_or(0);
                self.total_prompt_tokens += u64::from(*prompt_tokens);
                self.total_completion_tokens += u64::from(*completion_tokens);
                self.total_reasoning_tokens += u64::from(reasoning);
                self.total_latency_ms += latency_ms;

                let usage = self.model_usage.entry(model.clone()).or_default();
                usage.calls += 1;
                usage.prompt_tokens += u64::from(*prompt_tokens);
                usage.completion_tokens += u64::from(*completion_tokens);
                usage.reasoning_tokens += u64::from(reasoning);
                usage.latency_ms += latency_ms;

                self.recent_calls.push(ModelCallStats {
                    model: model.clone(),
                    prompt_tokens: *prompt_tokens,
                    completion_tokens: *completion_tokens,
                    reasoning_tokens: reasoning,
                    latency_ms: *latency_ms,
                });
                if self.recent_calls.len() > MAX_RECENT_CALLS {
                    let excess = self.recent_calls.len() - MAX_RECENT_CALLS;
                    self.recent_calls.drain(..excess);
                }
            }
            EventPayload::TurnCompleted { total_time_ms, .. } => {
                self.turn_times_ms.insert(event.turn_id, *total_time_ms);
            }
            _ => {}
        }
    }
}

impl AnalyticsProjection {
    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens + self.total_reasoning_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qm_domain::event::SCHEMA_VERSION;

    fn call(seq: u64, model: &str, prompt: u32, completion: u32) -> Event {
        Event {
            session_id: "s".into(),
            turn_id: 1,
            seq,
            ts_monotonic_ms: seq,
            ts_wall: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload: EventPayload::ModelCallCompleted {
                component: "agent".into(),
                model: model.into(),
                prompt_tokens: prompt,
                completion_tokens: completion,
                reasoning_tokens: None,
                latency_ms: 10,
            },
        }
    }

    #[test]
    fn accumulates_totals_and_per_model() {
        let mut p = AnalyticsProjection::default();
        p.apply(&call(0, "m1", 100, 20));
        p.apply(&call(1, "m1", 50, 10));
        p.apply(&call(2, "m2", 10, 5));

        assert_eq!(p.total_prompt_tokens, 160);
        assert_eq!(p.total_completion_tokens, 35);
        assert_eq!(p.total_tokens(), 195);
        assert_eq!(p.model_usage["m1"].calls, 2);
        assert_eq!(p.model_usage["m2"].prompt_tokens, 10);
    }

    #[test]
    fn recent_window_is_bounded() {
        let mut p = AnalyticsProjection::default();
        for i in 0..250 {
            p.apply(&call(i, "m", 1, 1));
        }
        assert_eq!(p.recent_calls.len(), MAX_RECENT_CALLS);
    }
}
