//! Signal primitive library
//!
//! The building blocks the layer factories are wired from: oscillators,
//! phase-controlled LFOs, noise, loop playback, filters, panning, the shared
//! reverberator, per-layer limiters and sample-accurate automation
//! parameters.

mod filter;
mod lfo;
mod limiter;
mod noise;
mod osc;
mod panner;
mod param;
mod reverb;
mod source;

pub use filter::{Biquad, BiquadKind};
pub use lfo::{lfo_phase, Modulator};
pub use limiter::{Limiter, LimiterParams};
pub use noise::{pink_loop, white_loop, PinkFilter};
pub use osc::{Oscillator, Wavetable};
pub use panner::pan_gains;
pub use param::{AutomatedParam, RampCurve};
pub use reverb::{Reverb, ReverbParams};
pub use source::LoopSource;

/// Time base for one render block
///
/// `t(i)` is the context-relative time of frame `i` in the block. Layers use
/// it to evaluate automation and modulators; offline chunks pass negative
/// start times while warming up state ahead of local zero.
#[derive(Debug, Clone, Copy)]
pub struct BlockClock {
    pub start_sec: f64,
    pub sample_rate: f64,
}

impl BlockClock {
    #[inline]
    pub fn t(&self, frame: usize) -> f64 {
        self.start_sec + frame as f64 / self.sample_rate
    }

    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.sample_rate
    }
}
