//! Background daemon — periodic decay and proactive nudges.
//!
//! Ticks on a fixed interval, pulling every modulator toward its
//! baseline and evaluating the ranked nudge conditions. All daemon
//! events carry turn_id 0. A tick failure is logged and the ticker
//! keeps running.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use qm_domain::config::DaemonConfig;
use qm_domain::error::Result;
use qm_domain::event::{EventPayload, DAEMON_TURN_ID};
use qm_domain::modulators::ModulatorName;

use crate::clock::Clock;
use crate::emitter::EventEmitter;
use crate::workspace::Workspace;

// Nudge condition ids, in priority order.
const HIGH_STRESS_SILENCE: &str = "high_stress_silence";
const DEADLINE_APPROACHING: &str = "deadline_approaching";
const RUPTURE_UNRESOLVED: &str = "rupture_unresolved";
const SESSION_BREAK: &str = "session_break";
const IDLE_CHECKIN: &str = "idle_checkin";

/// Silence thresholds, milliseconds.
const SILENCE_STRESS_MS: u64 = 300_000;
const SILENCE_IDLE_MS: u64 = 1_800_000;
const SESSION_BREAK_MS: u64 = 3_600_000;
const DEADLINE_WARNING_H: f64 = 1.0;
/// Rupture context goes stale after this.
const RUPTURE_WINDOW_MS: u64 = 1_800_000;

/// A nudge ready to fire.
struct Nudge {
    condition_id: &'static str,
    suggestion: &'static str,
    priority: u8,
    context: serde_json::Value,
    message_hint: String,
}

pub struct Daemon {
    cfg: DaemonConfig,
    emitter: Arc<EventEmitter>,
    workspace: Arc<Mutex<Workspace>>,
    clock: Arc<dyn Clock>,
    tick_count: AtomicU64,
    session_start_ms: u64,
    /// condition id → monotonic ms of last firing.
    last_fired: Mutex<HashMap<&'static str, u64>>,
    /// Interrupt budget windows: (window start ms, spent).
    hourly: Mutex<(u64, f64)>,
    daily: Mutex<(u64, f64)>,
}

impl Daemon {
    pub fn new(
        cfg: DaemonConfig,
        emitter: Arc<EventEmitter>,
        workspace: Arc<Mutex<Workspace>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.monotonic_ms();
        Self {
            cfg,
            emitter,
            workspace,
            clock,
            tick_count: AtomicU64::new(0),
            session_start_ms: now,
            last_fired: Mutex::new(HashMap::new()),
            hourly: Mutex::new((now, 0.0)),
            daily: Mutex::new((now, 0.0)),
        }
    }

    /// Spawn the tick loop. Cancel the token to stop it; an in-flight
    /// tick finishes before the task exits.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs_f64(self.cfg.tick_interval_s);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(err) = self.tick() {
                            tracing::warn!(error = %err, "daemon tick failed");
                        }
                    }
                }
            }
            tracing::debug!("daemon stopped");
        })
    }

    /// One tick: decay, then at most one nudge. Public so tests (and a
    /// manual `tick` command) can drive it with a manual clock.
    pub fn tick(&self) -> Result<()> {
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.emitter
            .emit(DAEMON_TURN_ID, EventPayload::DaemonTick { tick })?;

        self.apply_decay()?;

        if let Some(nudge) = self.check_nudges() {
            self.emitter.emit(
                DAEMON_TURN_ID,
                EventPayload::ProactiveNudge {
                    reason: nudge.condition_id.to_string(),
                    suggestion: nudge.suggestion.to_string(),
                    priority: nudge.priority,
                    context: nudge.context,
                    message_hint: nudge.message_hint,
                },
            )?;
        }
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Decay
    // ──────────────────────────────────────────────────────────────

    /// Exponential decay toward per-modulator baselines. Emits events
    /// only when something moved more than the reporting threshold.
    fn apply_decay(&self) -> Result<()> {
        let mut current = BTreeMap::new();
        let mut deltas = BTreeMap::new();
        let mut any = false;
        {
            let mut ws = self.workspace.lock();
            for name in ModulatorName::ALL {
                let value = ws.modulators.get(name);
                let baseline = name.baseline();
                let rate = self.cfg.decay.rate_for(name);
                let decayed = value - (value - baseline) * rate;
                let delta = decayed - value;
                if delta.abs() >= self.cfg.min_reportable_change {
                    ws.modulators.set(name, decayed);
                    deltas.insert(name, delta);
                    any = true;
                }
                current.insert(name, ws.modulators.get(name));
            }
            if any {
                ws.modulators.last_update = self.clock.now_wall();
            }
        }

        if any {
            self.emitter.emit(
                DAEMON_TURN_ID,
                EventPayload::ModulatorsDecayed {
                    current: current.clone(),
                    deltas,
                },
            )?;
            self.emitter.emit(
                DAEMON_TURN_ID,
                EventPayload::WorkspacePatched {
                    source: "daemon_decay".into(),
                    patch: serde_json::json!({ "modulators": current }),
                },
            )?;
        }
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────
    // Nudges
    // ──────────────────────────────────────────────────────────────

    /// First condition whose predicate, cooldown, and budget all allow.
    fn check_nudges(&self) -> Option<Nudge> {
        let now = self.clock.monotonic_ms();
        let candidates = [
            self.check_high_stress_silence(now),
            self.check_deadline_approaching(),
            self.check_rupture_unresolved(now),
            self.check_session_break(now),
            self.check_idle_checkin(now),
        ];

        for nudge in candidates.into_iter().flatten() {
            if !self.cooldown_allows(nudge.condition_id, now) {
                continue;
            }
            if !self.budget_allows(nudge.priority, now) {
                tracing::debug!(condition = nudge.condition_id, "nudge suppressed by budget");
                continue;
            }
            self.last_fired.lock().insert(nudge.condition_id, now);
            self.spend_budget(nudge.priority, now);
            return Some(nudge);
        }
        None
    }

    fn cooldown_for(&self, condition_id: &str) -> u64 {
        let n = &self.cfg.nudges;
        match condition_id {
            HIGH_STRESS_SILENCE => n.high_stress_silence_cooldown_s,
            DEADLINE_APPROACHING => n.deadline_approaching_cooldown_s,
            RUPTURE_UNRESOLVED => n.rupture_unresolved_cooldown_s,
            SESSION_BREAK => n.session_break_cooldown_s,
            IDLE_CHECKIN => n.idle_checkin_cooldown_s,
            _ => 300,
        }
    }

    fn cooldown_allows(&self, condition_id: &'static str, now: u64) -> bool {
        let last = self.last_fired.lock().get(condition_id).copied();
        match last {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.cooldown_for(condition_id) * 1000,
        }
    }

    /// Higher-priority nudges cost more against the hourly/daily budget.
    fn budget_allows(&self, priority: u8, now: u64) -> bool {
        let cost = nudge_cost(priority);
        let hourly_ok = {
            let mut window = self.hourly.lock();
            if now.saturating_sub(window.0) >= 3_600_000 {
                *window = (now, 0.0);
            }
            window.1 + cost <= self.cfg.nudges.hourly_budget
        };
        let daily_ok = {
            let mut window = self.daily.lock();
            if now.saturating_sub(window.0) >= 86_400_000 {
                *window = (now, 0.0);
            }
            window.1 + cost <= self.cfg.nudges.daily_budget
        };
        hourly_ok && daily_ok
    }

    fn spend_budget(&self, priority: u8, _now: u64) {
        let cost = nudge_cost(priority);
        self.hourly.lock().1 += cost;
        self.daily.lock().1 += cost;
    }

    fn check_high_stress_silence(&self, now: u64) -> Option<Nudge> {
        let ws = self.workspace.lock();
        if ws.stance.strain < 0.6 {
            return None;
        }
        let last = ws.last_user_message_ms?;
        let silence = now.saturating_sub(last);
        if silence < SILENCE_STRESS_MS {
            return None;
        }
        Some(Nudge {
            condition_id: HIGH_STRESS_SILENCE,
            suggestion: "gentle_checkin",
            priority: 3,
            context: serde_json::json!({
                "strain": ws.stance.strain,
                "silence_minutes": silence / 60_000,
            }),
            message_hint: "I noticed you might be going through something. No pressure to \
                           share, but I'm here if you want to talk."
                .into(),
        })
    }

    fn check_deadline_approaching(&self) -> Option<Nudge> {
        let ws = self.workspace.lock();
        let wall_now = self.clock.now_wall();
        for goal in ws.open_goals.iter().filter(|g| g.is_open()) {
            let Some(deadline) = goal.deadline else {
                continue;
            };
            let hours_until =
                (deadline - wall_now).num_seconds() as f64 / 3600.0;
            if hours_until > 0.0 && hours_until <= DEADLINE_WARNING_H {
                let text: String = goal.text.chars().take(50).collect();
                return Some(Nudge {
                    condition_id: DEADLINE_APPROACHING,
                    suggestion: "deadline_reminder",
                    priority: 2,
                    context: serde_json::json!({
                        "goal": goal.text,
                        "hours_until": (hours_until * 10.0).round() / 10.0,
                    }),
                    message_hint: format!(
                        "Quick heads up - your goal '{text}' has a deadline coming up soon."
                    ),
                });
            }
        }
        None
    }

    fn check_rupture_unresolved(&self, now: u64) -> Option<Nudge> {
        let ws = self.workspace.lock();
        if ws.stance.valence > -0.3 || ws.stance.strain < 0.5 || ws.stance.closeness > 0.4 {
            return None;
        }
        let last = ws.last_user_message_ms?;
        if now.saturating_sub(last) > RUPTURE_WINDOW_MS {
            return None;
        }
        Some(Nudge {
            condition_id: RUPTURE_UNRESOLVED,
            suggestion: "repair_attempt",
            priority: 4,
            context: serde_json::json!({
                "valence": ws.stance.valence,
                "strain": ws.stance.strain,
                "closeness": ws.stance.closeness,
            }),
            message_hint: "I sense things might have gotten tense. I want to understand \
                           better - can we talk about what happened?"
                .into(),
        })
    }

    fn check_session_break(&self, now: u64) -> Option<Nudge> {
        let session_ms = now.saturating_sub(self.session_start_ms);
        if session_ms < SESSION_BREAK_MS {
            return None;
        }
        let ws = self.workspace.lock();
        if ws.modulators.fatigue < 0.4 {
            return None;
        }
        Some(Nudge {
            condition_id: SESSION_BREAK,
            suggestion: "break_reminder",
            priority: 1,
            context: serde_json::json!({
                "session_minutes": session_ms / 60_000,
                "fatigue": ws.modulators.fatigue,
            }),
            message_hint: "We've been talking for a while. Maybe a good time for a short \
                           break?"
                .into(),
        })
    }

    fn check_idle_checkin(&self, now: u64) -> Option<Nudge> {
        let ws = self.workspace.lock();
        let last = ws.last_user_message_ms?;
        let silence = now.saturating_sub(last);
        if silence < SILENCE_IDLE_MS {
            return None;
        }
        if ws.open_goals.is_empty() && ws.stance.strain < 0.3 {
            return None;
        }
        Some(Nudge {
            condition_id: IDLE_CHECKIN,
            suggestion: "casual_checkin",
            priority: 0,
            context: serde_json::json!({
                "silence_minutes": silence / 60_000,
                "open_goals": ws.open_goals.len(),
            }),
            message_hint: "Hey, just checking in. How are things going?".into(),
        })
    }
}

fn nudge_cost(priority: u8) -> f64 {
    if priority >= 3 {
        2.0
    } else {
        1.0
    }
}
