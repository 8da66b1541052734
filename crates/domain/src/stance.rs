//! Stance vector — the eight-dimensional internal modulation state.
//!
//! Not a claim of human emotion: these scalars shape scheduling and
//! response style, nothing else.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of style notes kept on the stance.
pub const MAX_STANCE_NOTES: usize = 6;

/// The eight stance dimensions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StanceDim {
    Valence,
    Arousal,
    Control,
    Certainty,
    Safety,
    Closeness,
    Curiosity,
    Strain,
}

impl StanceDim {
    pub const ALL: [StanceDim; 8] = [
        StanceDim::Valence,
        StanceDim::Arousal,
        StanceDim::Control,
        StanceDim::Certainty,
        StanceDim::Safety,
        StanceDim::Closeness,
        StanceDim::Curiosity,
        StanceDim::Strain,
    ];

    /// Declared (min, max) range of the dimension.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            StanceDim::Valence => (-1.0, 1.0),
            _ => (0.0, 1.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StanceDim::Valence => "valence",
            StanceDim::Arousal => "arousal",
            StanceDim::Control => "control",
            StanceDim::Certainty => "certainty",
            StanceDim::Safety => "safety",
            StanceDim::Closeness => "closeness",
            StanceDim::Curiosity => "curiosity",
            StanceDim::Strain => "strain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.as_str() == s)
    }
}

/// A proposed per-dimension change, bounded by the reducer.
pub type StanceDelta = BTreeMap<StanceDim, f64>;

/// Affective-control state for response modulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StanceVector {
    /// [-1, 1] unpleasant → pleasant.
    pub valence: f64,
    /// [0, 1] calm → activated.
    pub arousal: f64,
    /// [0, 1] helpless → dominant.
    pub control: f64,
    /// [0, 1] confused → clear.
    pub certainty: f64,
    /// [0, 1] threatened → secure.
    pub safety: f64,
    /// [0, 1] distant → connected.
    pub closeness: f64,
    /// [0, 1] saturated → wondering.
    pub curiosity: f64,
    /// [0, 1] ease → overload.
    pub strain: f64,

    /// Turn that last updated the stance.
    #[serde(default)]
    pub turn_id: u64,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
    /// Short style notes, capped at [`MAX_STANCE_NOTES`].
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Default for StanceVector {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.3,
            control: 0.5,
            certainty: 0.5,
            safety: 0.7,
            closeness: 0.3,
            curiosity: 0.5,
            strain: 0.0,
            turn_id: 0,
            last_update: Utc::now(),
            notes: Vec::new(),
        }
    }
}

impl StanceVector {
    pub fn get(&self, dim: StanceDim) -> f64 {
        match dim {
            StanceDim::Valence => self.valence,
            StanceDim::Arousal => self.arousal,
            StanceDim::Control => self.control,
            StanceDim::Certainty => self.certainty,
            StanceDim::Safety => self.safety,
            StanceDim::Closeness => self.closeness,
            StanceDim::Curiosity => self.curiosity,
            StanceDim::Strain => self.strain,
        }
    }

    /// Set a dimension, clamping to its declared bounds.
    pub fn set(&mut self, dim: StanceDim, value: f64) {
        let (lo, hi) = dim.bounds();
        let v = value.clamp(lo, hi);
        match dim {
            StanceDim::Valence => self.valence = v,
            StanceDim::Arousal => self.arousal = v,
            StanceDim::Control => self.control = v,
            StanceDim::Certainty => self.certainty = v,
            StanceDim::Safety => self.safety = v,
            StanceDim::Closeness => self.closeness = v,
            StanceDim::Curiosity => self.curiosity = v,
            StanceDim::Strain => self.strain = v,
        }
    }

    /// Export all dimensions as an ordered map.
    pub fn to_map(&self) -> BTreeMap<StanceDim, f64> {
        StanceDim::ALL.iter().map(|&d| (d, self.get(d))).collect()
    }

    /// Push a style note, evicting the oldest past the cap.
    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
        while self.notes.len() > MAX_STANCE_NOTES {
            self.notes.remove(0);
        }
    }

    // ── Derived scalars (computed, never stored) ──────────────────

    /// How ready the system is to generate a response.
    pub fn readiness_to_speak(&self) -> f64 {
        ((self.certainty + self.control) / 2.0).clamp(0.0, 1.0)
    }

    /// How much to suppress unsolicited advice.
    pub fn advice_suppression(&self) -> f64 {
        (f64::max(0.0, 0.5 - self.certainty + (1.0 - self.safety) + self.strain) / 2.0)
            .clamp(0.0, 1.0)
    }

    /// Appetite for exploratory questions over settled answers.
    pub fn exploration_bias(&self) -> f64 {
        ((self.curiosity + (1.0 - self.strain)) / 2.0).clamp(0.0, 1.0)
    }

    /// Tone warmth.
    pub fn warmth_level(&self) -> f64 {
        ((self.closeness + f64::max(0.0, self.valence)) / 2.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_to_bounds() {
        let mut s = StanceVector::default();
        s.set(StanceDim::Valence, -3.0);
        assert_eq!(s.valence, -1.0);
        s.set(StanceDim::Strain, 1.7);
        assert_eq!(s.strain, 1.0);
    }

    #[test]
    fn notes_capped() {
        let mut s = StanceVector::default();
        for i in 0..10 {
            s.push_note(format!("note {i}"));
        }
        assert_eq!(s.notes.len(), MAX_STANCE_NOTES);
        assert_eq!(s.notes[0], "note 4");
    }

    #[test]
    fn derived_scalars_in_unit_range() {
        let mut s = StanceVector::default();
        s.certainty = 0.0;
        s.safety = 0.0;
        s.strain = 1.0;
        assert!(s.advice_suppression() <= 1.0);
        assert!(s.readiness_to_speak() >= 0.0);
        assert!(s.warmth_level() <= 1.0);
        assert!(s.exploration_bias() <= 1.0);
    }
}
