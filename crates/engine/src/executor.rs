//! Agent executor — parallel fan-out with independent timeouts.
//!
//! Each agent task loads its prompt, calls the model with JSON output,
//! and parses the reply into an [`AgentOutput`]. Failures never cross
//! task boundaries: a parse error, model error, or timeout becomes a
//! quiet output plus an `agent_failed` event. Results return in
//! agent-id order so the reducer's application order is canonical.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use qm_domain::agent::{AgentOutput, MemoryCandidate, MemoryKind};
use qm_domain::claim::{Claim, ClaimType, MAX_CLAIM_TEXT};
use qm_domain::config::TurnConfig;
use qm_domain::error::{Error, Result};
use qm_domain::event::EventPayload;
use qm_domain::model::{ChatMessage, ModelTier};
use qm_domain::stance::StanceDim;
use qm_providers::{CompletionRequest, ModelProvider};

use crate::clock::Clock;
use crate::emitter::EventEmitter;
use crate::prompts::PromptStore;

/// Immutable view of the workspace handed to agent tasks at wave start.
#[derive(Clone)]
pub struct AgentContext {
    pub prompt_context: String,
}

pub struct AgentExecutor {
    provider: Arc<dyn ModelProvider>,
    prompts: Arc<dyn PromptStore>,
    clock: Arc<dyn Clock>,
    cfg: TurnConfig,
}

impl AgentExecutor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        prompts: Arc<dyn PromptStore>,
        clock: Arc<dyn Clock>,
        cfg: TurnConfig,
    ) -> Self {
        Self {
            provider,
            prompts,
            clock,
            cfg,
        }
    }

    /// Run one wave of agents concurrently. Emits the wave and per-agent
    /// events; returns outputs sorted by agent id.
    pub async fn run_wave(
        &self,
        turn_id: u64,
        wave_idx: u32,
        agent_ids: &[String],
        ctx: &AgentContext,
        emitter: &Arc<EventEmitter>,
    ) -> Result<Vec<AgentOutput>> {
        emitter.emit(
            turn_id,
            EventPayload::WaveStarted {
                wave: wave_idx,
                agents: agent_ids.to_vec(),
            },
        )?;

        // Which agents have emitted their terminal event, so the wave
        // timeout path never double-resolves one.
        let resolved: Arc<parking_lot::Mutex<std::collections::BTreeSet<String>>> =
            Arc::new(parking_lot::Mutex::new(std::collections::BTreeSet::new()));

        let mut handles = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            let agent_id = agent_id.clone();
            let provider = self.provider.clone();
            let prompts = self.prompts.clone();
            let clock = self.clock.clone();
            let emitter = emitter.clone();
            let ctx = ctx.clone();
            let resolved = resolved.clone();
            let timeout = Duration::from_millis(self.cfg.agent_timeout_ms);

            handles.push((
                agent_id.clone(),
                tokio::spawn(async move {
                    let output = run_agent(
                        &agent_id, provider, prompts, clock, &emitter, turn_id, &ctx, timeout,
                    )
                    .await;
                    resolved.lock().insert(agent_id);
                    output
                }),
            ));
        }

        let wave_timeout = Duration::from_millis(self.cfg.wave_timeout_ms);
        // If this future is dropped (wave or turn timeout cancels the
        // subtree), the guard aborts every in-flight agent task so none
        // of them emits events into a later stage.
        let _guard = AbortGuard(
            handles
                .iter()
                .map(|(_, handle)| handle.abort_handle())
                .collect(),
        );
        let join_wave = async {
            let (ids, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
            let results = futures_util::future::join_all(tasks).await;
            let mut outputs = Vec::with_capacity(results.len());
            for (agent_id, result) in ids.into_iter().zip(results) {
                match result {
                    Ok(output) => outputs.push(output),
                    Err(join_err) => {
                        // Task panicked or was aborted; substitute quiet.
                        tracing::warn!(agent_id = %agent_id, error = %join_err, "agent task died");
                        let _ = emitter.emit(
                            turn_id,
                            EventPayload::AgentFailed {
                                agent_id: agent_id.clone(),
                                reason: format!("task error: {join_err}"),
                            },
                        );
                        outputs.push(AgentOutput::quiet(agent_id));
                    }
                }
            }
            outputs
        };

        let mut outputs = match tokio::time::timeout(wave_timeout, join_wave).await {
            Ok(outputs) => outputs,
            Err(_) => {
                // The whole wave overran its bound. Cancel the subtree
                // and substitute quiet outputs for the entire wave.
                for abort in &_guard.0 {
                    abort.abort();
                }
                tracing::warn!(wave = wave_idx, "wave timeout; substituting quiet outputs");
                let resolved = resolved.lock();
                agent_ids
                    .iter()
                    .map(|id| {
                        if !resolved.contains(id) {
                            let _ = emitter.emit(
                                turn_id,
                                EventPayload::AgentFailed {
                                    agent_id: id.clone(),
                                    reason: "wave timeout".into(),
                                },
                            );
                        }
                        AgentOutput::quiet(id.clone())
                    })
                    .collect()
            }
        };

        // Canonical order for deterministic reduction.
        outputs.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        emitter.emit(turn_id, EventPayload::WaveCompleted { wave: wave_idx })?;
        Ok(outputs)
    }
}

struct AbortGuard(Vec<tokio::task::AbortHandle>);

impl Drop for AbortGuard {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// One agent activation: prompt load → model call → parse. Always
/// resolves to an output; failures resolve to quiet.
#[allow(clippy::too_many_arguments)]
async fn run_agent(
    agent_id: &str,
    provider: Arc<dyn ModelProvider>,
    prompts: Arc<dyn PromptStore>,
    clock: Arc<dyn Clock>,
    emitter: &Arc<EventEmitter>,
    turn_id: u64,
    ctx: &AgentContext,
    timeout: Duration,
) -> AgentOutput {
    let started = clock.monotonic_ms();
    let _ = emitter.emit(
        turn_id,
        EventPayload::AgentStarted {
            agent_id: agent_id.to_string(),
        },
    );

    let result = tokio::time::timeout(
        timeout,
        call_agent(agent_id, &provider, &prompts, emitter, turn_id, ctx),
    )
    .await;

    let duration_ms = clock.monotonic_ms() - started;
    match result {
        Ok(Ok(mut output)) => {
            output.duration_ms = duration_ms;
            let _ = emitter.emit(
                turn_id,
                EventPayload::AgentCompleted {
                    agent_id: agent_id.to_string(),
                    observation: output.observation.clone(),
                    salience: output.salience,
                    urgency: output.urgency,
                    confidence: output.confidence,
                    claim_count: output.claims.len() as u32,
                    duration_ms,
                },
            );
            output
        }
        Ok(Err(err)) => {
            let _ = emitter.emit(
                turn_id,
                EventPayload::AgentFailed {
                    agent_id: agent_id.to_string(),
                    reason: err.to_string(),
                },
            );
            AgentOutput::quiet(agent_id)
        }
        Err(_) => {
            let _ = emitter.emit(
                turn_id,
                EventPayload::AgentFailed {
                    agent_id: agent_id.to_string(),
                    reason: format!("timeout after {}ms", timeout.as_millis()),
                },
            );
            AgentOutput::quiet(agent_id)
        }
    }
}

async fn call_agent(
    agent_id: &str,
    provider: &Arc<dyn ModelProvider>,
    prompts: &Arc<dyn PromptStore>,
    emitter: &Arc<EventEmitter>,
    turn_id: u64,
    ctx: &AgentContext,
) -> Result<AgentOutput> {
    let template = prompts.load(agent_id)?;
    let user_prompt = format!(
        "## Current Context\n\n{}\n\n## Task\n\nAssess from your perspective and answer with the JSON schema from your instructions.",
        ctx.prompt_context
    );

    let request = CompletionRequest::new(
        vec![ChatMessage::system(template), ChatMessage::user(user_prompt)],
        ModelTier::Small,
    )
    .json();

    let _ = emitter.emit(
        turn_id,
        EventPayload::ModelCallStarted {
            component: format!("agent:{agent_id}"),
            tier: ModelTier::Small,
            model: String::new(),
        },
    );

    let response = provider.complete(request).await?;

    let _ = emitter.emit(
        turn_id,
        EventPayload::ModelCallCompleted {
            component: format!("agent:{agent_id}"),
            model: response.model.clone(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            reasoning_tokens: response.reasoning_tokens,
            latency_ms: response.latency_ms,
        },
    );

    parse_agent_output(agent_id, &response.content)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse the model's JSON into a validated output. Out-of-range values
/// are clamped rather than rejected; claims get fresh short ids.
pub fn parse_agent_output(agent_id: &str, content: &str) -> Result<AgentOutput> {
    let data = extract_json(content)
        .ok_or_else(|| Error::Other(format!("no JSON object in response for {agent_id}")))?;

    let urgency = read_level(&data, "urgency");
    let confidence = read_level(&data, "confidence");

    let mut observation = data
        .get("observation")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    if observation.chars().count() > qm_domain::agent::MAX_OBSERVATION {
        observation = observation
            .chars()
            .take(qm_domain::agent::MAX_OBSERVATION)
            .collect();
    }

    let mut claims = Vec::new();
    if let Some(raw_claims) = data.get("claims").and_then(Value::as_array) {
        for raw in raw_claims {
            let Some(text) = raw.get("text").and_then(Value::as_str) else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            let claim_type = raw
                .get("type")
                .and_then(Value::as_str)
                .and_then(parse_claim_type)
                .unwrap_or(ClaimType::Observation);

            let mut claim = Claim::new(
                short_id(),
                text.chars().take(MAX_CLAIM_TEXT).collect::<String>(),
                claim_type,
                agent_id,
                urgency,
                confidence,
            );
            claim.supports = read_id_list(raw, "supports");
            claim.opposes = read_id_list(raw, "opposes");
            claims.push(claim);
        }
    }

    let stance_delta = data.get("stance_delta").and_then(Value::as_object).map(|map| {
        let mut delta = BTreeMap::new();
        for (key, value) in map {
            if let (Some(dim), Some(v)) = (StanceDim::parse(key), value.as_f64()) {
                delta.insert(dim, v);
            }
        }
        delta
    });
    let stance_delta = stance_delta.filter(|d| !d.is_empty());

    let memory_candidates = data
        .get("memory_candidates")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let text = item.get("text").and_then(Value::as_str)?;
                    let kind = match item.get("kind").and_then(Value::as_str) {
                        Some("episode") => MemoryKind::Episode,
                        Some("preference") => MemoryKind::Preference,
                        _ => MemoryKind::Fact,
                    };
                    Some(MemoryCandidate {
                        kind,
                        text: text.to_string(),
                        importance: item
                            .get("importance")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.5)
                            .clamp(0.0, 1.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let salience = f64::from(urgency) * f64::from(confidence) / 9.0;

    Ok(AgentOutput {
        agent_id: agent_id.to_string(),
        observation,
        salience,
        urgency,
        confidence,
        claims,
        stance_delta,
        workspace_patch: data.get("workspace_patch").cloned().filter(Value::is_object),
        memory_candidates,
        duration_ms: 0,
    })
}

fn read_level(data: &Value, key: &str) -> u8 {
    data.get(key)
        .and_then(Value::as_u64)
        .map(|v| v.min(3) as u8)
        .unwrap_or(0)
}

fn read_id_list(raw: &Value, key: &str) -> Vec<String> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_claim_type(s: &str) -> Option<ClaimType> {
    match s {
        "observation" => Some(ClaimType::Observation),
        "recommendation" => Some(ClaimType::Recommendation),
        "concern" => Some(ClaimType::Concern),
        "question" => Some(ClaimType::Question),
        _ => None,
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

/// Pull a JSON object out of a model reply: direct parse, fenced code
/// block, or the outermost brace span.
fn extract_json(content: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(content.trim()) {
        if v.is_object() {
            return Some(v);
        }
    }

    if let Some(fenced) = content.split("```").nth(1) {
        let body = fenced.strip_prefix("json").unwrap_or(fenced).trim();
        if let Ok(v) = serde_json::from_str::<Value>(body) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok().filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::prompts::FsPromptStore;
    use qm_providers::ScriptedProvider;
    use qm_store::EventLog;

    #[test]
    fn parses_full_output() {
        let content = r#"{
            "observation": "User sounds stretched thin",
            "urgency": 2,
            "confidence": 3,
            "claims": [
                {"text": "workload is unsustainable", "type": "concern"},
                {"text": "ask about the deadline", "type": "question"}
            ],
            "stance_delta": {"strain": 0.1, "bogus": 0.5},
            "workspace_patch": {"pending_asks": ["which deadline?"]}
        }"#;
        let out = parse_agent_output("emotion.stress", content).unwrap();
        assert_eq!(out.urgency, 2);
        assert_eq!(out.confidence, 3);
        assert!((out.salience - 6.0 / 9.0).abs() < 1e-9);
        assert_eq!(out.claims.len(), 2);
        assert_eq!(out.claims[0].claim_type, ClaimType::Concern);
        assert_eq!(out.claims[0].source_agent, "emotion.stress");
        let delta = out.stance_delta.unwrap();
        assert_eq!(delta.len(), 1);
        assert!(delta.contains_key(&StanceDim::Strain));
    }

    #[test]
    fn parses_fenced_json() {
        let content = "Here you go:\n```json\n{\"observation\": \"ok\", \"urgency\": 1, \"confidence\": 1, \"claims\": []}\n```";
        let out = parse_agent_output("a.b", content).unwrap();
        assert_eq!(out.observation, "ok");
        assert_eq!(out.urgency, 1);
    }

    #[test]
    fn parses_brace_span_fallback() {
        let content = "noise before {\"observation\": \"x\", \"urgency\": 0, \"confidence\": 0, \"claims\": []} noise after";
        assert!(parse_agent_output("a.b", content).is_ok());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_agent_output("a.b", "not json at all").is_err());
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        let content = r#"{"observation": "x", "urgency": 9, "confidence": 7, "claims": []}"#;
        let out = parse_agent_output("a.b", content).unwrap();
        assert_eq!(out.urgency, 3);
        assert_eq!(out.confidence, 3);
    }

    fn test_emitter(clock: Arc<ManualClock>) -> Arc<EventEmitter> {
        Arc::new(EventEmitter::new(
            Arc::new(EventLog::in_memory("s")),
            clock,
        ))
    }

    #[tokio::test]
    async fn wave_returns_outputs_in_agent_id_order() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(ScriptedProvider::new());
        let executor = AgentExecutor::new(
            provider,
            Arc::new(FsPromptStore::new("/nonexistent")),
            clock.clone(),
            TurnConfig::default(),
        );
        let emitter = test_emitter(clock);
        let ctx = AgentContext {
            prompt_context: "ctx".into(),
        };

        let ids = vec!["z.last".to_string(), "a.first".to_string()];
        let outputs = executor
            .run_wave(1, 0, &ids, &ctx, &emitter)
            .await
            .unwrap();
        assert_eq!(outputs[0].agent_id, "a.first");
        assert_eq!(outputs[1].agent_id, "z.last");
    }

    #[tokio::test]
    async fn failing_agent_becomes_quiet_with_event() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(ScriptedProvider::with_handler(|_| {
            Err(qm_domain::Error::Other("model exploded".into()))
        }));
        let executor = AgentExecutor::new(
            provider,
            Arc::new(FsPromptStore::new("/nonexistent")),
            clock.clone(),
            TurnConfig::default(),
        );
        let emitter = test_emitter(clock);
        let ctx = AgentContext {
            prompt_context: "ctx".into(),
        };

        let outputs = executor
            .run_wave(1, 0, &["x.y".to_string()], &ctx, &emitter)
            .await
            .unwrap();
        assert!(outputs[0].is_quiet());

        let events = emitter.log().replay_turn(1);
        assert!(events
            .iter()
            .any(|e| matches!(&e.payload, EventPayload::AgentFailed { agent_id, .. } if agent_id == "x.y")));
        // Started/failed pairing still holds before wave completion.
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        use qm_domain::event::EventKind as K;
        let started = kinds.iter().position(|k| *k == K::AgentStarted).unwrap();
        let failed = kinds.iter().position(|k| *k == K::AgentFailed).unwrap();
        let wave_done = kinds.iter().position(|k| *k == K::WaveCompleted).unwrap();
        assert!(started < failed && failed < wave_done);
    }
}
