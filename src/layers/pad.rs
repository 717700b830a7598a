//! Modulated pad
//!
//! Three slightly detuned generators, each frequency-wobbled by its own slow
//! chorus LFO, mixed and pre-rendered once into a fixed-length loop. The
//! live path only runs the cheap stages: loop playback, a slow amplitude
//! LFO, and a low-pass filter whose cutoff the stage scheduler automates.
//! Unconditional, like the carrier.

use rand::Rng;

use crate::dsp::{
    lfo_phase, AutomatedParam, Biquad, BiquadKind, BlockClock, Limiter, LimiterParams, LoopSource,
    Modulator, Oscillator, RampCurve,
};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::cache::{BufferCache, CacheKey};
use crate::graph::scheduler::StageField;
use crate::layers::LayerBuild;
use crate::timeline::StageRecipe;

const PAD_BASE_HZ: f64 = 110.0;
const PAD_LOOP_SEC: f64 = 30.0;
const AMP_LFO_RATE_HZ: f64 = 0.03;
const AMP_LFO_DEPTH: f64 = 0.25;
const FILTER_Q: f64 = 0.7;

#[derive(Debug)]
pub struct PadLayer {
    source: LoopSource,
    amp: Modulator,
    filter: Biquad,
    cutoff: AutomatedParam,
    gain: f32,
    limiter: Limiter,
}

impl PadLayer {
    pub fn build(
        ctx: &mut RenderContext,
        cache: &mut BufferCache,
        build: &LayerBuild,
    ) -> Result<Self> {
        let rate = ctx.sample_rate();
        let frames = (PAD_LOOP_SEC * rate as f64).ceil() as u64;
        ctx.reserve_prerender(frames)?;

        let mut rng = build.rng("pad");
        let loop_buffer = cache.get_or_insert_with(CacheKey::PadLoop, || {
            Ok(render_chorus_loop(rate, frames as usize, &mut rng))
        })?;

        let origin = build.origin_sec(rate as f64);
        let cutoff_init = build.field_value(StageField::PadCutoff, rate as f64);

        Ok(Self {
            source: LoopSource::new(loop_buffer, build.origin_frames),
            amp: Modulator::new(
                ctx,
                AMP_LFO_RATE_HZ,
                AMP_LFO_DEPTH,
                lfo_phase(AMP_LFO_RATE_HZ, origin),
            ),
            filter: Biquad::new(BiquadKind::LowPass, cutoff_init, FILTER_Q, rate as f64),
            cutoff: AutomatedParam::new(cutoff_init),
            gain: build.config.pad_gain_multiplier as f32,
            limiter: Limiter::new(LimiterParams::protective(), rate as f64),
        })
    }

    pub fn set_filter(&mut self, cutoff_hz: f64, when: f64, ramp: f64) {
        self.cutoff.ramp_to(cutoff_hz, when, ramp, RampCurve::Linear);
    }

    pub fn pin_filter(&mut self, cutoff_hz: f64, at: f64) {
        self.cutoff.set_value_at(cutoff_hz, at);
    }

    pub fn apply_stage(&mut self, recipe: &StageRecipe, when: f64, ramp: f64) {
        self.set_filter(recipe.pad_cutoff_hz, when, ramp);
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let dry = self.source.tick().0 as f64 * self.amp.tick(t, dt);
            self.filter.set_cutoff(self.cutoff.value_at(t));
            let wet = self.filter.process(dry) * self.gain;
            l_buf[i] = wet;
            r_buf[i] = wet;
        }
        self.limiter.process(out);
    }
}

/// Pre-render the detuned three-oscillator chorus mix
fn render_chorus_loop(sample_rate: u32, frames: usize, rng: &mut rand::rngs::StdRng) -> AudioBuffer {
    let dt = 1.0 / sample_rate as f64;
    let mut voices: Vec<(Oscillator, f64, Oscillator, f64, f64)> = (0..3)
        .map(|k| {
            let freq = PAD_BASE_HZ * (1.0 + (k as f64 - 1.0) * 0.02);
            let chorus_rate = 0.02 + rng.gen_range(0.0..0.04);
            let chorus_depth = 0.5 + rng.gen_range(0.0..0.6);
            (
                Oscillator::new(0.0),
                freq,
                Oscillator::new(0.0),
                chorus_rate,
                chorus_depth,
            )
        })
        .collect();

    let mut buffer = AudioBuffer::new(frames, ChannelLayout::Mono, sample_rate);
    for sample in buffer.channel_mut(0).iter_mut() {
        let mut acc = 0.0f32;
        for (osc, freq, chorus, chorus_rate, chorus_depth) in voices.iter_mut() {
            let wobble = *chorus_depth * chorus.tick(*chorus_rate, dt) as f64;
            acc += osc.tick(*freq + wobble, dt);
        }
        *sample = acc;
    }
    buffer
}
