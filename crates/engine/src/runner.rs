//! Turn runner — the state machine sequencing one user turn.
//!
//! `ingest → sensing_fast → context → agents → deliberation → council →
//! voice → critics → memory_commit → completed`, with the safety
//! interrupt and timeout shortcuts of the stage graph. The runner is the
//! sole mutator of the workspace; agent tasks only ever see snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::Instrument;

use qm_domain::agent::{AgentOutput, MemoryCandidate, MemoryKind};
use qm_domain::config::Config;
use qm_domain::council::{CouncilDecision, CriticFinding, Intent};
use qm_domain::error::Result;
use qm_domain::event::{EventPayload, TurnStage, DAEMON_TURN_ID};
use qm_domain::sensors::{sensor, SensorName};
use qm_providers::ModelProvider;
use qm_store::SnapshotStore;

use crate::clock::Clock;
use crate::council;
use crate::deliberation::{DeliberationState, RoundPlan};
use crate::emitter::EventEmitter;
use crate::executor::{AgentContext, AgentExecutor};
use crate::critics::Critics;
use crate::prompts::PromptStore;
use crate::registry::AgentRegistry;
use crate::scheduler::Scheduler;
use crate::sensors::run_fast_sensors;
use crate::voice::{fallback_text, Voice, VoicePromptInput};
use crate::workspace::{TailMessage, Workspace};

/// Outcome of one completed turn.
#[derive(Debug)]
pub struct TurnResult {
    pub turn_id: u64,
    /// Rendered response; `None` when the council chose silence.
    pub response: Option<String>,
    pub decision: CouncilDecision,
    pub consensus: f64,
    pub critic_findings: Vec<CriticFinding>,
    pub total_time_ms: u64,
}

pub struct TurnRunner {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    emitter: Arc<EventEmitter>,
    workspace: Arc<Mutex<Workspace>>,
    registry: Arc<AgentRegistry>,
    scheduler: Scheduler,
    executor: AgentExecutor,
    voice: Voice,
    critics: Critics,
    snapshots: Option<Arc<SnapshotStore>>,
    next_turn: AtomicU64,
}

impl TurnRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn ModelProvider>,
        prompts: Arc<dyn PromptStore>,
        registry: Arc<AgentRegistry>,
        emitter: Arc<EventEmitter>,
        workspace: Arc<Mutex<Workspace>>,
        snapshots: Option<Arc<SnapshotStore>>,
    ) -> Self {
        // User turns continue strictly increasing across restarts: pick
        // up after both the snapshot's turn counter and the log's.
        let max_logged_turn = emitter
            .log()
            .replay_session()
            .iter()
            .map(|e| e.turn_id)
            .max()
            .unwrap_or(0);
        let next = max_logged_turn.max(workspace.lock().turn_id) + 1;

        Self {
            scheduler: Scheduler::new(config.scheduler.clone(), clock.clone()),
            executor: AgentExecutor::new(
                provider.clone(),
                prompts,
                clock.clone(),
                config.turn.clone(),
            ),
            voice: Voice::new(provider, clock.clone()),
            critics: Critics::new(),
            config,
            clock,
            emitter,
            workspace,
            registry,
            snapshots,
            next_turn: AtomicU64::new(next),
        }
    }

    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    pub fn workspace(&self) -> &Arc<Mutex<Workspace>> {
        &self.workspace
    }

    /// Emit `session_started` on a fresh log.
    pub fn start_session(&self) -> Result<()> {
        if self.emitter.log().is_empty() {
            self.emitter
                .emit(DAEMON_TURN_ID, EventPayload::SessionStarted {})?;
        }
        Ok(())
    }

    pub fn end_session(&self) -> Result<()> {
        self.emitter
            .emit(DAEMON_TURN_ID, EventPayload::SessionEnded {})?;
        Ok(())
    }

    fn stage(&self, turn_id: u64, stage: TurnStage) -> Result<()> {
        self.emitter
            .emit(turn_id, EventPayload::TurnStageChanged { stage })?;
        Ok(())
    }

    /// Run one full turn for a user utterance.
    pub async fn run_turn(&self, user_text: &str) -> Result<TurnResult> {
        let turn_id = self.next_turn.fetch_add(1, Ordering::SeqCst);
        let t0 = self.clock.monotonic_ms();
        let span = tracing::info_span!("turn", turn_id);

        match self
            .run_turn_inner(turn_id, user_text, t0)
            .instrument(span)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                // Fatal (persistence) failure: leave stance/modulators at
                // pre-turn values and surface an inline error event. The
                // turn stays replayable, marked incomplete by the missing
                // turn_completed.
                tracing::error!(error = %err, "turn aborted");
                {
                    let mut ws = self.workspace.lock();
                    ws.rollback_turn();
                    ws.reset_for_turn();
                }
                let _ = self.emitter.emit(
                    turn_id,
                    EventPayload::Error {
                        message: err.to_string(),
                        stage: None,
                    },
                );
                Err(err)
            }
        }
    }

    async fn run_turn_inner(
        &self,
        turn_id: u64,
        user_text: &str,
        t0: u64,
    ) -> Result<TurnResult> {
        self.emitter.emit(
            turn_id,
            EventPayload::TurnStarted {
                user_input: user_text.to_string(),
            },
        )?;

        // ── ingest ────────────────────────────────────────────────
        self.stage(turn_id, TurnStage::Ingest)?;
        {
            let mut ws = self.workspace.lock();
            ws.reset_for_turn();
            ws.begin_turn(user_text, turn_id, t0);
        }

        // ── sensing_fast ──────────────────────────────────────────
        self.stage(turn_id, TurnStage::SensingFast)?;
        let sensors = run_fast_sensors(user_text);
        self.workspace.lock().sensors = sensors.clone();
        self.emitter.emit(
            turn_id,
            EventPayload::SensorsFastUpdated {
                sensors: sensors.clone(),
            },
        )?;

        let mut delib = DeliberationState::new(self.config.deliberation.clone());
        let mut memory_pool: Vec<MemoryCandidate> = Vec::new();
        let mut forced_intent = None;
        let mut rounds_run = 0;

        let safety = sensor(&sensors, SensorName::SafetyRisk);
        if safety > self.config.sensors.safety_interrupt_threshold {
            // Safety interrupt: no agent waves, straight to council with
            // a forced protect intent.
            self.emitter.emit(
                turn_id,
                EventPayload::SafetyInterrupt {
                    sensor: SensorName::SafetyRisk,
                    value: safety,
                },
            )?;
            forced_intent = Some(Intent::Protect);
        } else {
            // ── context ───────────────────────────────────────────
            self.stage(turn_id, TurnStage::Context)?;
            self.refresh_context(turn_id)?;

            // ── agents + deliberation under the turn budget ───────
            self.stage(turn_id, TurnStage::Agents)?;
            let budget = Duration::from_millis(self.config.turn.turn_timeout_ms);
            // Bind the timeout result first so the phase future (and its
            // borrow of the deliberation state) is dropped before the
            // timeout arm touches it.
            let phase_result = tokio::time::timeout(
                budget,
                self.agents_and_deliberation(turn_id, &mut delib, &mut memory_pool),
            )
            .await;
            match phase_result {
                Ok(rounds) => rounds_run = rounds?,
                Err(_) => {
                    // Turn timeout: fall through to council with
                    // whatever claims exist.
                    tracing::warn!(turn_id, "turn timeout; jumping to council");
                    self.emitter.emit(
                        turn_id,
                        EventPayload::TimingCheckpoint {
                            label: "turn_timeout".into(),
                            elapsed_ms: self.clock.monotonic_ms() - t0,
                        },
                    )?;
                    let claims = self.workspace.lock().active_claims.clone();
                    delib.sync_claims(&claims);
                    rounds_run = delib.rounds_run();
                }
            }
        }

        // ── council ───────────────────────────────────────────────
        self.stage(turn_id, TurnStage::Council)?;
        let consensus = delib.consensus();
        let decision = {
            let mut ws = self.workspace.lock();
            let decision =
                council::decide(&ws, delib.graph(), &consensus, rounds_run, forced_intent);
            ws.current_goal = Some(decision.speech_act.intent);
            ws.constraints = decision.speech_act.do_not.clone();
            ws.consensus_level = consensus.overall_score;
            decision
        };
        self.emitter.emit(
            turn_id,
            EventPayload::CouncilDecisionMade {
                speak: decision.speak,
                urgency: decision.urgency,
                intent: decision.speech_act.intent,
                key_points: decision.speech_act.key_points.clone(),
                rounds: rounds_run,
                consensus: consensus.overall_score,
            },
        )?;

        // ── voice + critics (regeneration loop) ───────────────────
        let (response_text, critic_findings) =
            self.render_with_critics(turn_id, &decision).await?;

        if let Some(text) = &response_text {
            let mut ws = self.workspace.lock();
            ws.current_response = Some(text.clone());
            ws.push_tail("assistant", text);
        }

        // ── memory_commit ─────────────────────────────────────────
        self.stage(turn_id, TurnStage::MemoryCommit)?;
        let committed = self.commit_memory(turn_id, &memory_pool)?;
        self.emitter.emit(
            turn_id,
            EventPayload::MemoryCommitted {
                committed: committed as u32,
            },
        )?;

        // ── completed ─────────────────────────────────────────────
        self.stage(turn_id, TurnStage::Completed)?;
        let total_time_ms = self.clock.monotonic_ms() - t0;
        self.emitter.emit(
            turn_id,
            EventPayload::TurnCompleted {
                total_time_ms,
                response: response_text.clone(),
            },
        )?;

        // Claims and consensus reset at turn end; stance and modulators
        // persist.
        self.workspace.lock().reset_for_turn();

        Ok(TurnResult {
            turn_id,
            response: response_text,
            consensus: consensus.overall_score,
            decision,
            critic_findings,
            total_time_ms,
        })
    }

    // ──────────────────────────────────────────────────────────────
    // Context
    // ──────────────────────────────────────────────────────────────

    /// Refresh the workspace tail from the canonical Session projection
    /// and surface what long-term memory we have for this session.
    fn refresh_context(&self, turn_id: u64) -> Result<()> {
        let window = self.config.workspace.conversation_window;
        let tail = self
            .emitter
            .with_projections(|p| p.session.tail(window * 2));
        {
            let mut ws = self.workspace.lock();
            ws.set_tail(
                tail.into_iter()
                    .map(|(role, content)| TailMessage { role, content })
                    .collect(),
            );
        }

        let (episodes, facts) = match &self.snapshots {
            Some(snapshots) => {
                let records = snapshots
                    .read_records(&memory_key(self.emitter.session_id()))
                    .unwrap_or_default();
                let episodes = records
                    .iter()
                    .filter(|r| r.get("kind").and_then(Value::as_str) == Some("episode"))
                    .count();
                (episodes, records.len() - episodes)
            }
            None => (0, 0),
        };
        self.emitter.emit(
            turn_id,
            EventPayload::MemoryRetrieved {
                episode_count: episodes as u32,
                fact_count: facts as u32,
            },
        )?;
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Agents + deliberation
    // ──────────────────────────────────────────────────────────────

    async fn agents_and_deliberation(
        &self,
        turn_id: u64,
        delib: &mut DeliberationState,
        memory_pool: &mut Vec<MemoryCandidate>,
    ) -> Result<u32> {
        let (waves, ctx) = {
            let ws = self.workspace.lock();
            let waves = self
                .scheduler
                .plan_waves(&self.registry, &ws.sensors, &ws.modulators);
            let ctx = AgentContext {
                prompt_context: ws.prompt_context(),
            };
            (waves, ctx)
        };

        let mut wave_idx = 0u32;
        for wave in &waves {
            let outputs = self
                .executor
                .run_wave(turn_id, wave_idx, wave, &ctx, &self.emitter)
                .await?;
            self.apply_outputs(turn_id, &outputs, memory_pool)?;
            wave_idx += 1;
        }

        // ── deliberation ──────────────────────────────────────────
        self.stage(turn_id, TurnStage::Deliberation)?;
        self.emitter.emit(
            turn_id,
            EventPayload::DelibRoundStarted {
                round: 0,
                contested: 0,
            },
        )?;
        {
            let ws = self.workspace.lock();
            delib.sync_claims(&ws.active_claims);
        }
        self.emit_round_completed(turn_id, delib, 0)?;

        loop {
            match delib.plan_next_round() {
                RoundPlan::Exit(reason) => {
                    tracing::debug!(?reason, round = delib.round(), "deliberation finished");
                    break;
                }
                RoundPlan::Followup(agents) => {
                    let round = delib.round();
                    let contested = delib.graph().contested_claims().len() as u32;
                    self.emitter.emit(
                        turn_id,
                        EventPayload::DelibRoundStarted { round, contested },
                    )?;

                    // Focused re-assessment with the current workspace.
                    let ctx = AgentContext {
                        prompt_context: self.workspace.lock().prompt_context(),
                    };
                    let outputs = self
                        .executor
                        .run_wave(turn_id, wave_idx, &agents, &ctx, &self.emitter)
                        .await?;
                    wave_idx += 1;
                    self.apply_outputs(turn_id, &outputs, memory_pool)?;
                    {
                        let ws = self.workspace.lock();
                        delib.sync_claims(&ws.active_claims);
                    }
                    self.emit_round_completed(turn_id, delib, round)?;
                }
            }
        }

        let consensus = delib.consensus();
        self.emitter.emit(
            turn_id,
            EventPayload::ConsensusUpdated {
                score: consensus.overall_score,
                by_type: consensus.by_type.clone(),
                claim_count: consensus.claim_count as u32,
            },
        )?;

        Ok(delib.rounds_run())
    }

    fn emit_round_completed(
        &self,
        turn_id: u64,
        delib: &DeliberationState,
        round: u32,
    ) -> Result<()> {
        let consensus = delib.consensus();
        self.emitter.emit(
            turn_id,
            EventPayload::DelibRoundCompleted {
                round,
                claim_count: consensus.claim_count as u32,
                consensus: consensus.overall_score,
            },
        )?;
        Ok(())
    }

    /// Apply a wave's outputs (already in canonical order) through the
    /// reducer and emit the matching state events.
    fn apply_outputs(
        &self,
        turn_id: u64,
        outputs: &[AgentOutput],
        memory_pool: &mut Vec<MemoryCandidate>,
    ) -> Result<()> {
        let mut ws = self.workspace.lock();
        for output in outputs {
            let outcome = ws.apply(output);

            if outcome.stance_changed() {
                self.emitter.emit(
                    turn_id,
                    EventPayload::StanceUpdated {
                        delta: outcome.stance_applied.clone(),
                        current: ws.stance.to_map(),
                    },
                )?;
            }
            if outcome.modulator_changed.is_some() {
                self.emitter.emit(
                    turn_id,
                    EventPayload::ModulatorsUpdated {
                        agent_id: output.agent_id.clone(),
                        current: ws.modulators.to_map(),
                    },
                )?;
            }
            if outcome.patch_applied {
                self.emitter.emit(
                    turn_id,
                    EventPayload::WorkspacePatched {
                        source: output.agent_id.clone(),
                        patch: output.workspace_patch.clone().unwrap_or(Value::Null),
                    },
                )?;
            }

            memory_pool.extend(output.memory_candidates.iter().cloned());

            if let Some(manifest) = self.registry.get(&output.agent_id) {
                self.scheduler.mark_fired(manifest);
            }
        }
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Voice + critics
    // ──────────────────────────────────────────────────────────────

    async fn render_with_critics(
        &self,
        turn_id: u64,
        decision: &CouncilDecision,
    ) -> Result<(Option<String>, Vec<CriticFinding>)> {
        if !decision.speak {
            // Stage machine still visits critics on the silent path.
            self.stage(turn_id, TurnStage::Critics)?;
            self.emitter.emit(
                turn_id,
                EventPayload::CriticsUpdated {
                    passed: true,
                    findings: Vec::new(),
                },
            )?;
            return Ok((None, Vec::new()));
        }

        let input = VoicePromptInput::from_workspace(&self.workspace.lock());
        let max_attempts = self.config.turn.max_regen_attempts.max(1);
        let mut revision_notes: Vec<String> = Vec::new();
        let mut attempt = 1;

        loop {
            self.stage(turn_id, TurnStage::Voice)?;
            let rendered = self
                .voice
                .render(decision, &input, &self.emitter, turn_id, attempt, &revision_notes)
                .await;

            self.stage(turn_id, TurnStage::Critics)?;
            let (passed, findings) = {
                let ws = self.workspace.lock();
                self.critics
                    .review(&rendered.text, &ws, decision, turn_id, attempt)
            };
            self.emitter.emit(
                turn_id,
                EventPayload::CriticsUpdated {
                    passed,
                    findings: findings.clone(),
                },
            )?;

            if passed {
                return Ok((Some(rendered.text), findings));
            }
            if attempt >= max_attempts {
                // Out of regenerations: substitute the intent-keyed safe
                // fallback.
                tracing::warn!(turn_id, "critics still blocking; using fallback text");
                let fallback = fallback_text(decision.speech_act.intent).to_string();
                return Ok((Some(fallback), findings));
            }

            revision_notes = Critics::revision_notes(&findings);
            attempt += 1;
        }
    }

    // ──────────────────────────────────────────────────────────────
    // Memory
    // ──────────────────────────────────────────────────────────────

    /// Persist worthwhile candidates and snapshot the workspace.
    fn commit_memory(&self, turn_id: u64, pool: &[MemoryCandidate]) -> Result<usize> {
        if !pool.is_empty() {
            self.emitter.emit(
                turn_id,
                EventPayload::MemoryCandidatesProposed {
                    candidates: pool.to_vec(),
                },
            )?;
        }

        let Some(snapshots) = &self.snapshots else {
            return Ok(0);
        };

        let kept: Vec<&MemoryCandidate> =
            pool.iter().filter(|c| c.importance >= 0.3).collect();
        let key = memory_key(self.emitter.session_id());
        for candidate in &kept {
            let record = serde_json::json!({
                "kind": kind_str(candidate.kind),
                "text": candidate.text,
                "importance": candidate.importance,
                "turn_id": turn_id,
            });
            snapshots.append_record(&key, &record)?;
        }

        let snapshot = self.workspace.lock().snapshot();
        snapshots.save(
            &format!("workspace-{}", self.emitter.session_id()),
            &snapshot,
        )?;

        Ok(kept.len())
    }
}

fn memory_key(session_id: &str) -> String {
    format!("memory-{session_id}")
}

fn kind_str(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Fact => "fact",
        MemoryKind::Episode => "episode",
        MemoryKind::Preference => "preference",
    }
}
