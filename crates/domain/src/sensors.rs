//! The fixed sensor vocabulary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The closed set of sensor names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SensorName {
    Vulnerability,
    AdviceRequested,
    RelationalBid,
    AiFeelingsProbe,
    HumorMasking,
    Rupture,
    Ambiguity,
    SafetyRisk,
    PromptInjection,
}

impl SensorName {
    pub const ALL: [SensorName; 9] = [
        SensorName::Vulnerability,
        SensorName::AdviceRequested,
        SensorName::RelationalBid,
        SensorName::AiFeelingsProbe,
        SensorName::HumorMasking,
        SensorName::Rupture,
        SensorName::Ambiguity,
        SensorName::SafetyRisk,
        SensorName::PromptInjection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorName::Vulnerability => "vulnerability",
            SensorName::AdviceRequested => "advice_requested",
            SensorName::RelationalBid => "relational_bid",
            SensorName::AiFeelingsProbe => "ai_feelings_probe",
            SensorName::HumorMasking => "humor_masking",
            SensorName::Rupture => "rupture",
            SensorName::Ambiguity => "ambiguity",
            SensorName::SafetyRisk => "safety_risk",
            SensorName::PromptInjection => "prompt_injection",
        }
    }
}

/// Sensor probabilities for one turn, every value in [0, 1].
pub type SensorMap = BTreeMap<SensorName, f64>;

/// Read a sensor with a 0.0 default for absent entries.
pub fn sensor(map: &SensorMap, name: SensorName) -> f64 {
    map.get(&name).copied().unwrap_or(0.0)
}
