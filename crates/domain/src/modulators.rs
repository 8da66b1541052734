//! Global modulators — slowly-decaying scalars that bias scheduling.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four modulators.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModulatorName {
    Arousal,
    Fatigue,
    TimePressure,
    SocialRisk,
}

impl ModulatorName {
    pub const ALL: [ModulatorName; 4] = [
        ModulatorName::Arousal,
        ModulatorName::Fatigue,
        ModulatorName::TimePressure,
        ModulatorName::SocialRisk,
    ];

    /// Value the modulator drifts toward between interactions.
    pub fn baseline(self) -> f64 {
        match self {
            ModulatorName::Arousal => 0.3,
            _ => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModulatorName::Arousal => "arousal",
            ModulatorName::Fatigue => "fatigue",
            ModulatorName::TimePressure => "time_pressure",
            ModulatorName::SocialRisk => "social_risk",
        }
    }
}

/// System-wide affective signals, each in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modulators {
    pub arousal: f64,
    pub fatigue: f64,
    pub time_pressure: f64,
    pub social_risk: f64,

    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
    /// Which agent last nudged each modulator.
    #[serde(default)]
    pub source_agents: BTreeMap<ModulatorName, String>,
}

impl Default for Modulators {
    fn default() -> Self {
        Self {
            arousal: ModulatorName::Arousal.baseline(),
            fatigue: 0.0,
            time_pressure: 0.0,
            social_risk: 0.0,
            last_update: Utc::now(),
            source_agents: BTreeMap::new(),
        }
    }
}

impl Modulators {
    pub fn get(&self, name: ModulatorName) -> f64 {
        match name {
            ModulatorName::Arousal => self.arousal,
            ModulatorName::Fatigue => self.fatigue,
            ModulatorName::TimePressure => self.time_pressure,
            ModulatorName::SocialRisk => self.social_risk,
        }
    }

    /// Set a modulator, clamped to [0, 1].
    pub fn set(&mut self, name: ModulatorName, value: f64) {
        let v = value.clamp(0.0, 1.0);
        match name {
            ModulatorName::Arousal => self.arousal = v,
            ModulatorName::Fatigue => self.fatigue = v,
            ModulatorName::TimePressure => self.time_pressure = v,
            ModulatorName::SocialRisk => self.social_risk = v,
        }
    }

    pub fn to_map(&self) -> BTreeMap<ModulatorName, f64> {
        ModulatorName::ALL.iter().map(|&m| (m, self.get(m))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_to_unit_interval() {
        let mut m = Modulators::default();
        m.set(ModulatorName::Fatigue, 2.5);
        assert_eq!(m.fatigue, 1.0);
        m.set(ModulatorName::SocialRisk, -0.5);
        assert_eq!(m.social_risk, 0.0);
    }

    #[test]
    fn default_baselines() {
        let m = Modulators::default();
        assert_eq!(m.arousal, 0.3);
        assert_eq!(m.fatigue, 0.0);
        assert_eq!(m.time_pressure, 0.0);
        assert_eq!(m.social_risk, 0.0);
    }
}
