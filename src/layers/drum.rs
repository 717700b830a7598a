//! Percussive loop
//!
//! A ten-second loop at a very slow fixed tempo: two detuned decaying tone
//! bursts from the enriched drum wavetable, each with seeded per-hit
//! frequency, pan and gain jitter, low-passed and pre-rendered offline.
//! Playback is loop-only; besides its on/off switch the layer has no live
//! automation.

use rand::rngs::StdRng;
use rand::Rng;

use crate::dsp::{
    pan_gains, AutomatedParam, Biquad, BiquadKind, BlockClock, Limiter, LimiterParams, LoopSource,
    Oscillator, RampCurve, Wavetable,
};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::cache::{BufferCache, CacheKey};
use crate::layers::LayerBuild;

/// 6 BPM: one bar of the two-hit pattern
const LOOP_SEC: f64 = 10.0;
const LOOP_GAIN: f32 = 0.847;
const HIT_FILTER_HZ: f64 = 350.0;
const HIT_FILTER_Q: f64 = 0.2;

#[derive(Debug)]
pub struct DrumLayer {
    source: LoopSource,
    limiter: Limiter,
}

impl DrumLayer {
    pub fn build(
        ctx: &mut RenderContext,
        cache: &mut BufferCache,
        build: &LayerBuild,
    ) -> Result<Self> {
        let rate = ctx.sample_rate();
        let frames = (LOOP_SEC * rate as f64).ceil() as u64;
        ctx.reserve_prerender(frames)?;

        let mut rng = build.rng("drum");
        let buffer = cache.get_or_insert_with(CacheKey::DrumLoop, || {
            Ok(render_loop(rate, frames as usize, &mut rng))
        })?;

        Ok(Self {
            source: LoopSource::new(buffer, build.origin_frames),
            limiter: Limiter::new(LimiterParams::protective(), rate as f64),
        })
    }

    pub fn render(&mut self, out: &mut AudioBuffer, _clock: &BlockClock) {
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let (l, r) = self.source.tick();
            l_buf[i] = l;
            r_buf[i] = r;
        }
        self.limiter.process(out);
    }
}

fn render_loop(sample_rate: u32, frames: usize, rng: &mut StdRng) -> AudioBuffer {
    let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo, sample_rate);
    let table = Wavetable::drum();
    schedule_hit(&mut buffer, &table, rng, 40.0, 0.0, 12.0, 0.65);
    schedule_hit(&mut buffer, &table, rng, 55.0, 0.0, 4.0, 0.45);
    buffer
}

/// Synthesize one decaying burst into the loop buffer
fn schedule_hit(
    buffer: &mut AudioBuffer,
    table: &Wavetable,
    rng: &mut StdRng,
    freq: f64,
    time: f64,
    decay: f64,
    gain: f64,
) {
    let rate = buffer.sample_rate as f64;
    let dt = 1.0 / rate;

    let freq = freq + rng.gen_range(-1.0..1.0);
    let pan = rng.gen_range(-0.9..0.9);
    let gain = gain + rng.gen_range(-0.1..0.1);

    let mut env = AutomatedParam::new(0.0);
    env.set_value_at(0.0, time);
    env.ramp_to(gain, time, 0.01, RampCurve::Linear);
    env.ramp_to(0.001, time + 0.01, decay - 0.01, RampCurve::Exponential);

    let mut osc = Oscillator::new(0.0);
    let mut lowpass = Biquad::new(BiquadKind::LowPass, HIT_FILTER_HZ, HIT_FILTER_Q, rate);
    let (gl, gr) = pan_gains(pan);

    let start = (time * rate) as usize;
    let end = (((time + decay + 0.1) * rate) as usize).min(buffer.len());
    let (l_buf, r_buf) = buffer.stereo_mut();
    for i in start..end {
        let t = i as f64 * dt;
        let raw = osc.tick_table(table, freq, dt) as f64 * env.value_at(t);
        let s = lowpass.process(raw) * LOOP_GAIN;
        l_buf[i] += s * gl;
        r_buf[i] += s * gr;
    }
}
