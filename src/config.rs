//! Engine configuration
//!
//! Fade and ramp durations, gain trims and render defaults. One immutable
//! `EngineConfig` is handed to the session and the offline renderer at
//! construction; nothing reads ambient global state.

use serde::{Deserialize, Serialize};

/// Floor used in place of zero for exponential ramps and fade targets.
///
/// Exponential decay can never reach zero; ramping to this value and then
/// stepping to silence is inaudible and click-free.
pub const MIN_GAIN: f64 = 0.0001;

/// Engine-wide tuning knobs
///
/// Defaults reproduce the reference soundscape voicing; everything is
/// serializable so a host can ship its own profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Initial master volume and the fixed offline render volume
    pub default_master_gain: f64,
    /// Gain trim applied after the pad filter
    pub pad_gain_multiplier: f64,
    /// Gain trim on the deep-sleep binaural layer
    pub deep_sleep_gain_multiplier: f64,
    /// Fade-out applied by `stop`, in seconds
    pub fade_duration_sec: f64,
    /// Fade-out applied by `pause`, in seconds
    pub pause_fade_sec: f64,
    /// Fade-in applied by `play`/`resume`, in seconds
    pub resume_fade_sec: f64,
    /// Each half of a crossfaded preset transition, in seconds
    pub preset_fade_sec: f64,
    /// Ramp used when moving between stages
    pub stage_ramp_sec: f64,
    /// Ramp used by per-layer on/off switches
    pub toggle_ramp_sec: f64,
    /// Ramp used by volume/intensity changes
    pub control_ramp_sec: f64,
    /// Return gain of the shared reverb into the master bus
    pub reverb_return: f64,
    /// Seconds between singing-bowl strikes
    pub bowl_interval_sec: f64,
    /// How far ahead of the clock bowl strikes are scheduled
    pub bowl_lookahead_sec: f64,
    /// Default offline chunk length, in seconds
    pub chunk_duration_sec: f64,
    /// Seed for all deterministic jitter (drum hits, pad chorus, reverb taps)
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_master_gain: 0.45,
            pad_gain_multiplier: 0.6,
            deep_sleep_gain_multiplier: 0.15,
            fade_duration_sec: 3.0,
            pause_fade_sec: 1.0,
            resume_fade_sec: 2.0,
            preset_fade_sec: 1.0,
            stage_ramp_sec: 4.0,
            toggle_ramp_sec: 0.5,
            control_ramp_sec: 0.1,
            reverb_return: 1.0,
            bowl_interval_sec: 60.0,
            bowl_lookahead_sec: 0.2,
            chunk_duration_sec: 15.0,
            seed: 0x5eed_50ad,
        }
    }
}
