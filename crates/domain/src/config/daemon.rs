//! Daemon configuration — tick interval, decay rates, nudge policy.

use serde::{Deserialize, Serialize};

use crate::modulators::ModulatorName;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "d_tick_interval_s")]
    pub tick_interval_s: f64,
    /// Proportion of the distance to baseline removed per tick.
    #[serde(default)]
    pub decay: DecayRates,
    /// Smallest per-modulator change worth reporting as an event.
    #[serde(default = "d_min_reportable_change")]
    pub min_reportable_change: f64,
    #[serde(default)]
    pub nudges: NudgeConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_s: d_tick_interval_s(),
            decay: DecayRates::default(),
            min_reportable_change: d_min_reportable_change(),
            nudges: NudgeConfig::default(),
        }
    }
}

fn d_tick_interval_s() -> f64 {
    30.0
}

fn d_min_reportable_change() -> f64 {
    0.005
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayRates {
    #[serde(default = "d_arousal_rate")]
    pub arousal: f64,
    #[serde(default = "d_fatigue_rate")]
    pub fatigue: f64,
    #[serde(default = "d_time_pressure_rate")]
    pub time_pressure: f64,
    #[serde(default = "d_social_risk_rate")]
    pub social_risk: f64,
}

impl Default for DecayRates {
    fn default() -> Self {
        Self {
            arousal: d_arousal_rate(),
            fatigue: d_fatigue_rate(),
            time_pressure: d_time_pressure_rate(),
            social_risk: d_social_risk_rate(),
        }
    }
}

impl DecayRates {
    pub fn rate_for(&self, m: ModulatorName) -> f64 {
        match m {
            ModulatorName::Arousal => self.arousal,
            ModulatorName::Fatigue => self.fatigue,
            ModulatorName::TimePressure => self.time_pressure,
            ModulatorName::SocialRisk => self.social_risk,
        }
    }
}

fn d_arousal_rate() -> f64 {
    0.10
}

fn d_fatigue_rate() -> f64 {
    0.05
}

fn d_time_pressure_rate() -> f64 {
    0.15
}

fn d_social_risk_rate() -> f64 {
    0.10
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Nudges
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeConfig {
    /// Per-condition cooldowns, seconds.
    #[serde(default = "d_cooldown_high_stress")]
    pub high_stress_silence_cooldown_s: u64,
    #[serde(default = "d_cooldown_deadline")]
    pub deadline_approaching_cooldown_s: u64,
    #[serde(default = "d_cooldown_rupture")]
    pub rupture_unresolved_cooldown_s: u64,
    #[serde(default = "d_cooldown_session_break")]
    pub session_break_cooldown_s: u64,
    #[serde(default = "d_cooldown_idle")]
    pub idle_checkin_cooldown_s: u64,
    /// Interrupt budget: nudges allowed per hour / per day.
    #[serde(default = "d_hourly_budget")]
    pub hourly_budget: f64,
    #[serde(default = "d_daily_budget")]
    pub daily_budget: f64,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            high_stress_silence_cooldown_s: d_cooldown_high_stress(),
            deadline_approaching_cooldown_s: d_cooldown_deadline(),
            rupture_unresolved_cooldown_s: d_cooldown_rupture(),
            session_break_cooldown_s: d_cooldown_session_break(),
            idle_checkin_cooldown_s: d_cooldown_idle(),
            hourly_budget: d_hourly_budget(),
            daily_budget: d_daily_budget(),
        }
    }
}

fn d_cooldown_high_stress() -> u64 {
    600
}

fn d_cooldown_deadline() -> u64 {
    1800
}

fn d_cooldown_rupture() -> u64 {
    900
}

fn d_cooldown_session_break() -> u64 {
    3600
}

fn d_cooldown_idle() -> u64 {
    1800
}

fn d_hourly_budget() -> f64 {
    3.0
}

fn d_daily_budget() -> f64 {
    12.0
}
