//! Soundscape layer factories
//!
//! One module per layer. Each factory takes the rendering context plus a
//! [`LayerBuild`] describing where in the session the layer comes alive, and
//! returns a self-contained voice: oscillators, modulators, loop playback
//! and a closing limiter, with named setters for whatever the stage
//! scheduler automates. Optional layers are wrapped in the tagged
//! [`LayerKind`] so the graph can hold them uniformly without duck typing.

mod bowl;
mod brain_pulse;
mod carrier;
mod deep_sleep;
mod drum;
mod iso;
mod noise_bed;
mod pad;
mod resonant_pulse;
mod wind;

pub use bowl::BowlLayer;
pub use brain_pulse::BrainPulseLayer;
pub use carrier::CarrierLayer;
pub use deep_sleep::DeepSleepLayer;
pub use drum::DrumLayer;
pub use iso::IsoLayer;
pub use noise_bed::NoiseBedLayer;
pub use pad::PadLayer;
pub use resonant_pulse::ResonantPulseLayer;
pub use wind::WindLayer;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::EngineConfig;
use crate::dsp::BlockClock;
use crate::engine::buffer::AudioBuffer;
use crate::graph::scheduler::{stage_target, StageField, StageTrack};
use crate::timeline::{SessionTimeline, StageRecipe};

/// Where and when a layer is being built
///
/// `origin_frames` is the layer's phase origin: the number of frames a
/// continuous render would have produced before this layer's local time
/// zero. Offline chunks pass their (warmup-shifted) start frame so every
/// periodic element resumes mid-cycle; live graphs pass the current clock
/// frame and no timeline, since nothing needs to line up with a past that
/// was never rendered.
#[derive(Debug, Clone, Copy)]
pub struct LayerBuild<'a> {
    /// Recipe used for initial parameter values when no timeline is given
    pub initial: &'a StageRecipe,
    /// Present only for offline chunks: enables stage-tracked value and
    /// phase reconstruction at the origin
    pub timeline: Option<&'a SessionTimeline>,
    /// Continuous-render frames elapsed before this graph's local zero
    pub origin_frames: u64,
    /// Stage ramp used when reconstructing mid-ramp values
    pub stage_ramp_sec: f64,
    pub config: &'a EngineConfig,
    /// Session seed; all layer jitter derives from it
    pub seed: u64,
}

impl LayerBuild<'_> {
    /// Origin in seconds at the given sample rate
    pub fn origin_sec(&self, sample_rate: f64) -> f64 {
        self.origin_frames as f64 / sample_rate
    }

    /// Deterministic RNG for one layer's jitter, stable across chunks
    pub fn rng(&self, tag: &str) -> StdRng {
        // FNV-1a over the tag, folded into the session seed
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in tag.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        StdRng::seed_from_u64(self.seed ^ hash)
    }

    /// Value a stage-automated field holds at the origin
    pub fn field_value(&self, field: StageField, sample_rate: f64) -> f64 {
        match self.timeline {
            Some(timeline) => StageTrack::build(timeline, field, self.stage_ramp_sec)
                .value_at(self.origin_sec(sample_rate)),
            None => stage_target(self.initial, field),
        }
    }

    /// Phase (cycles) an oscillator driven by a stage-tracked frequency has
    /// accumulated by the origin
    pub fn tracked_phase(&self, field: StageField, sample_rate: f64) -> f64 {
        match self.timeline {
            Some(timeline) => StageTrack::build(timeline, field, self.stage_ramp_sec)
                .sample_sum(sample_rate, self.origin_frames),
            None => 0.0,
        }
    }
}

/// Tagged optional-layer variant held by the mix graph
#[derive(Debug)]
pub enum LayerKind {
    Iso(IsoLayer),
    Noise(NoiseBedLayer),
    Wind(WindLayer),
    Drum(DrumLayer),
    Bowl(BowlLayer),
    DeepSleep(DeepSleepLayer),
    BrainPulse(BrainPulseLayer),
    ResonantPulse(ResonantPulseLayer),
}

impl LayerKind {
    /// Render one block into `out` (overwriting it)
    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        match self {
            LayerKind::Iso(layer) => layer.render(out, clock),
            LayerKind::Noise(layer) => layer.render(out, clock),
            LayerKind::Wind(layer) => layer.render(out, clock),
            LayerKind::Drum(layer) => layer.render(out, clock),
            LayerKind::Bowl(layer) => layer.render(out, clock),
            LayerKind::DeepSleep(layer) => layer.render(out, clock),
            LayerKind::BrainPulse(layer) => layer.render(out, clock),
            LayerKind::ResonantPulse(layer) => layer.render(out, clock),
        }
    }
}
