//! Scheduler — decides which agents run, in which waves.
//!
//! Wave 0 is every always-on agent. Wave 1 picks the highest-priority
//! candidates given sensors, modulator pressure, cooldowns, and the
//! token budget. Ties break on agent id so planning is deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use qm_domain::agent::{AgentManifest, AgentPriority};
use qm_domain::config::SchedulerConfig;
use qm_domain::modulators::Modulators;
use qm_domain::sensors::{sensor, SensorMap, SensorName};

use crate::clock::Clock;
use crate::registry::AgentRegistry;

pub struct Scheduler {
    cfg: SchedulerConfig,
    clock: Arc<dyn Clock>,
    /// agent id → monotonic ms until which it may not fire.
    cooldown_until: Mutex<HashMap<String, u64>>,
}

impl Scheduler {
    pub fn new(cfg: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            cooldown_until: Mutex::new(HashMap::new()),
        }
    }

    /// Plan the waves for one turn.
    pub fn plan_waves(
        &self,
        registry: &AgentRegistry,
        sensors: &SensorMap,
        modulators: &Modulators,
    ) -> Vec<Vec<String>> {
        let mut waves = Vec::new();

        let always_on = registry.always_on();
        if !always_on.is_empty() {
            waves.push(always_on);
        }

        let scheduled = self.schedule_wave(registry, sensors, modulators);
        if !scheduled.is_empty() {
            waves.push(scheduled);
        }

        waves
    }

    fn schedule_wave(
        &self,
        registry: &AgentRegistry,
        sensors: &SensorMap,
        modulators: &Modulators,
    ) -> Vec<String> {
        let now = self.clock.monotonic_ms();
        let cooldowns = self.cooldown_until.lock();

        let mut candidates: Vec<(&AgentManifest, f64)> = registry
            .iter()
            .filter(|m| m.priority != AgentPriority::AlwaysOn)
            .filter(|m| cooldowns.get(&m.id).is_none_or(|&until| now >= until))
            .filter_map(|m| {
                let score = priority_score(m, sensors, modulators);
                (score > 0.0).then_some((m, score))
            })
            .collect();

        // Descending score, agent id breaks ties.
        candidates.sort_by(|(ma, sa), (mb, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ma.id.cmp(&mb.id))
        });

        let mut wave = Vec::new();
        let mut spent: u32 = 0;
        for (m, score) in candidates {
            if wave.len() >= self.cfg.max_agents_per_wave {
                break;
            }
            if spent + m.cost_estimate > self.cfg.token_budget {
                tracing::debug!(
                    agent_id = %m.id,
                    score,
                    spent,
                    "dropping candidate over token budget"
                );
                continue;
            }
            spent += m.cost_estimate;
            wave.push(m.id.clone());
        }
        wave
    }

    /// Record that an agent fired and start its cooldown.
    pub fn mark_fired(&self, manifest: &AgentManifest) {
        let cooldown_s = if manifest.cooldown_s > 0 {
            manifest.cooldown_s
        } else if manifest.priority == AgentPriority::AlwaysOn {
            // Always-on agents never cool down.
            return;
        } else {
            self.cfg.default_cooldown_s
        };
        let until = self.clock.monotonic_ms() + cooldown_s * 1000;
        self.cooldown_until.lock().insert(manifest.id.clone(), until);
    }

    /// Whether the agent is currently held back by its cooldown.
    pub fn on_cooldown(&self, agent_id: &str) -> bool {
        let now = self.clock.monotonic_ms();
        self.cooldown_until
            .lock()
            .get(agent_id)
            .is_some_and(|&until| now < until)
    }
}

/// Sensor-driven activation, modulator pressure, and the monitor bonus.
fn priority_score(manifest: &AgentManifest, sensors: &SensorMap, modulators: &Modulators) -> f64 {
    let mut score = 0.0;
    let agency = manifest.agency();

    // Sensor-driven activation.
    let vulnerability = sensor(sensors, SensorName::Vulnerability);
    let advice = sensor(sensors, SensorName::AdviceRequested);
    let relational = sensor(sensors, SensorName::RelationalBid);
    let injection = sensor(sensors, SensorName::PromptInjection);
    let safety = sensor(sensors, SensorName::SafetyRisk);

    if agency == "emotion" && vulnerability > 0.3 {
        score += vulnerability;
    }
    if agency == "reasoning" && advice > 0.3 {
        score += advice;
    }
    if agency == "social" && relational > 0.3 {
        score += relational;
    }
    if agency == "inhibition" && injection > 0.3 {
        score += injection;
    }
    if agency == "monitoring" && safety > 0.3 {
        score += safety;
    }

    // Modulator pressure.
    if matches!(agency, "emotion" | "monitoring") && modulators.arousal > 0.6 {
        score += 0.3;
    }
    if agency == "planning" && modulators.time_pressure > 0.5 {
        score += 0.3;
    }
    if matches!(agency, "social" | "inhibition") && modulators.social_risk > 0.5 {
        score += 0.3;
    }

    // Monitor agents get a small base bonus.
    if manifest.priority == AgentPriority::Monitor {
        score += 0.2;
    }

    score
}
