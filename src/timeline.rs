//! Session timeline data model
//!
//! A session is a sequence of [`StageRecipe`]s spread evenly over a total
//! duration, plus the per-layer [`ToggleSet`] and shared intensity. These
//! types are plain data: the scheduler and graph assembler interpret them,
//! nothing here touches audio state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DriftwaveError, Result};

/// Floor for the derived left/right carrier frequencies, in Hz
///
/// Keeps a large beat offset from driving an ear tone inaudible or negative.
pub const MIN_EAR_HZ: f64 = 8.0;

// ============================================================================
// Layer keys and toggles
// ============================================================================

/// Identity of each optional soundscape layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerKey {
    Iso,
    Noise,
    Wind,
    Drum,
    Bowl,
    DeepSleep,
    BrainPulse,
    ResonantPulse,
}

impl LayerKey {
    /// All optional layers, in graph assembly order
    pub const ALL: [LayerKey; 8] = [
        LayerKey::Iso,
        LayerKey::Noise,
        LayerKey::Wind,
        LayerKey::Drum,
        LayerKey::Bowl,
        LayerKey::DeepSleep,
        LayerKey::BrainPulse,
        LayerKey::ResonantPulse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKey::Iso => "iso",
            LayerKey::Noise => "noise",
            LayerKey::Wind => "wind",
            LayerKey::Drum => "drum",
            LayerKey::Bowl => "bowl",
            LayerKey::DeepSleep => "deepSleep",
            LayerKey::BrainPulse => "brainPulse",
            LayerKey::ResonantPulse => "resonantPulse",
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional layers are enabled for a session
///
/// Layers absent from the map are treated as disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToggleSet {
    entries: std::collections::BTreeMap<LayerKey, bool>,
}

impl ToggleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything on: useful for tests and the CLI's default session
    pub fn all_enabled() -> Self {
        let mut set = Self::new();
        for key in LayerKey::ALL {
            set.set(key, true);
        }
        set
    }

    /// Everything off: the unconditional carrier and pad still play
    pub fn all_disabled() -> Self {
        let mut set = Self::new();
        for key in LayerKey::ALL {
            set.set(key, false);
        }
        set
    }

    pub fn set(&mut self, key: LayerKey, enabled: bool) {
        self.entries.insert(key, enabled);
    }

    pub fn enabled(&self, key: LayerKey) -> bool {
        self.entries.get(&key).copied().unwrap_or(false)
    }
}

// ============================================================================
// Stage recipes
// ============================================================================

/// Target parameter values for one named point in the session timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecipe {
    pub name: String,
    /// Center frequency of the binaural carrier pair, in Hz
    pub base_frequency: f64,
    /// Difference between the two ears, in Hz; must be non-negative
    pub beat_frequency: f64,
    /// Pad low-pass cutoff target, in Hz
    pub pad_cutoff_hz: f64,
    /// Isochronic gating rate, in Hz
    pub iso_rate_hz: f64,
    /// Pink-noise bed gain target
    pub noise_gain: f64,
    /// Whether the deep-sleep binaural layer is audible during this stage
    #[serde(default)]
    pub deep_sleep_on: bool,
}

impl StageRecipe {
    pub fn validate(&self) -> Result<()> {
        if self.beat_frequency < 0.0 {
            return Err(DriftwaveError::InvalidParameter {
                param: "beat_frequency",
                value: self.beat_frequency.to_string(),
                expected: "a non-negative frequency in Hz",
            });
        }
        if !self.base_frequency.is_finite() || self.base_frequency <= 0.0 {
            return Err(DriftwaveError::InvalidParameter {
                param: "base_frequency",
                value: self.base_frequency.to_string(),
                expected: "a positive frequency in Hz",
            });
        }
        Ok(())
    }
}

/// Left/right carrier frequencies derived from a base/beat pair
///
/// Both ears are clamped to [`MIN_EAR_HZ`]; a beat wider than twice the base
/// therefore narrows instead of inverting.
pub fn binaural_ears(base: f64, beat: f64) -> (f64, f64) {
    (
        (base - beat / 2.0).max(MIN_EAR_HZ),
        (base + beat / 2.0).max(MIN_EAR_HZ),
    )
}

// ============================================================================
// Session timeline
// ============================================================================

/// A stage sequence stretched over a fixed total duration
///
/// Stage intervals are equal-length; moving from stage `i-1` to stage `i`
/// ramps every automatable parameter over the configured stage ramp starting
/// at `stage_start(i)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeline {
    pub stages: Vec<StageRecipe>,
    pub total_duration_sec: f64,
}

impl SessionTimeline {
    pub fn new(stages: Vec<StageRecipe>, total_duration_sec: f64) -> Result<Self> {
        let timeline = Self {
            stages,
            total_duration_sec,
        };
        timeline.validate()?;
        Ok(timeline)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(DriftwaveError::InvalidTimeline {
                reason: "a session needs at least one stage".to_string(),
            });
        }
        if !self.total_duration_sec.is_finite() || self.total_duration_sec <= 0.0 {
            return Err(DriftwaveError::InvalidTimeline {
                reason: format!("total duration {} is not positive", self.total_duration_sec),
            });
        }
        for stage in &self.stages {
            stage.validate()?;
        }
        Ok(())
    }

    /// Seconds each stage occupies
    pub fn stage_duration(&self) -> f64 {
        self.total_duration_sec / self.stages.len() as f64
    }

    /// Timeline position at which stage `index` begins
    pub fn stage_start(&self, index: usize) -> f64 {
        index as f64 * self.stage_duration()
    }

    /// Index of the stage whose interval contains `t` (clamped to the last)
    pub fn stage_index_at(&self, t: f64) -> usize {
        if t <= 0.0 {
            return 0;
        }
        let idx = (t / self.stage_duration()) as usize;
        idx.min(self.stages.len() - 1)
    }
}

// ============================================================================
// Presets and session specs
// ============================================================================

/// A complete soundscape program: stages plus layer mix
///
/// Preset content itself is authored by the host application; the engine only
/// consumes the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub stages: Vec<StageRecipe>,
    pub toggles: ToggleSet,
    pub intensity: f64,
}

/// Everything needed to run or render one session, as accepted by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSpec {
    pub timeline: SessionTimeline,
    pub toggles: ToggleSet,
    /// Shared effects-bus gain in [0, 1]
    pub intensity: f64,
    /// Master volume in [0, 1]
    pub master_volume: f64,
}
