//! Brain-pulse loop
//!
//! A fifteen-second compound loop pre-rendered once and cached: a main tone
//! sweeping 55 Hz down to 20 Hz under a tremolo whose own rate slows from
//! 4 Hz to 1 Hz, a chorus pair gliding 27.5 Hz to 20 Hz, a slow panner
//! drift, and a glue compression stage baked into the buffer. Playback is
//! loop-only, so phase consistency across chunks comes from the loop start
//! offset alone. Kept out of the shared reverb send: the wash smears the
//! pulse's spatial movement.

use crate::dsp::{
    pan_gains, AutomatedParam, BlockClock, Limiter, LimiterParams, LoopSource, Oscillator,
    RampCurve,
};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::cache::{BufferCache, CacheKey};
use crate::layers::LayerBuild;

const LOOP_SEC: f64 = 15.0;
const FADE_IN_SEC: f64 = 0.02;
const FADE_OUT_SEC: f64 = 1.5;
const TREMOLO_DEPTH: f64 = 0.5;
const PAN_LFO_RATE_HZ: f64 = 0.1;

#[derive(Debug)]
pub struct BrainPulseLayer {
    source: LoopSource,
    limiter: Limiter,
}

impl BrainPulseLayer {
    pub fn build(
        ctx: &mut RenderContext,
        cache: &mut BufferCache,
        build: &LayerBuild,
    ) -> Result<Self> {
        let rate = ctx.sample_rate();
        let frames = (LOOP_SEC * rate as f64).ceil() as u64;
        ctx.reserve_prerender(frames)?;

        let buffer = cache.get_or_insert_with(CacheKey::BrainPulseLoop, || {
            Ok(render_loop(rate, frames as usize))
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

fn render_loop(sample_rate: u32, frames: usize) -> AudioBuffer {
    let rate = sample_rate as f64;
    let dt = 1.0 / rate;
    let end = LOOP_SEC;

    // Frequency glides over the loop
    let mut main_freq = AutomatedParam::new(55.0);
    main_freq.ramp_to(20.0, 0.0, end, RampCurve::Linear);
    let mut tremolo_rate = AutomatedParam::new(4.0);
    tremolo_rate.ramp_to(1.0, 0.0, end, RampCurve::Linear);
    let mut chorus_freq = AutomatedParam::new(27.5);
    chorus_freq.ramp_to(20.0, 0.0, end, RampCurve::Linear);

    // Amplitude plan: fade in fast, duck out over the last 1.5 s so the
    // loop seam lands in silence
    let mut volume = AutomatedParam::new(0.0);
    volume.ramp_to(1.0, 0.0, FADE_IN_SEC, RampCurve::Linear);
    volume.set_value_at(1.0, end - FADE_OUT_SEC);
    volume.ramp_to(0.0, end - FADE_OUT_SEC, FADE_OUT_SEC, RampCurve::Linear);

    let mut chorus_gain = AutomatedParam::new(0.0);
    chorus_gain.ramp_to(0.05, 0.0, FADE_IN_SEC, RampCurve::Linear);
    chorus_gain.set_value_at(0.3, end - FADE_OUT_SEC);
    chorus_gain.ramp_to(0.0, end - FADE_OUT_SEC, FADE_OUT_SEC, RampCurve::Linear);

    let mut main = Oscillator::new(0.0);
    let mut tremolo = Oscillator::new(0.0);
    let mut pan_lfo = Oscillator::new(0.0);
    let mut chorus_a = Oscillator::new(0.0);
    let mut chorus_b = Oscillator::new(0.25);

    let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo, sample_rate);
    {
        let (l_buf, r_buf) = buffer.stereo_mut();
        for i in 0..frames {
            let t = i as f64 * dt;

            let trem = TREMOLO_DEPTH * tremolo.tick(tremolo_rate.value_at(t), dt) as f64;
            let vol = (volume.value_at(t) + trem).max(0.0);
            let tone = main.tick(main_freq.value_at(t), dt) as f64 * vol;

            let (gl, gr) = pan_gains(pan_lfo.tick(PAN_LFO_RATE_HZ, dt) as f64);

            let cf = chorus_freq.value_at(t);
            let chorus = (chorus_a.tick(cf, dt) as f64 + chorus_b.tick(cf, dt) as f64)
                * chorus_gain.value_at(t);

            l_buf[i] = (tone * gl as f64 + chorus * 0.5) as f32;
            r_buf[i] = (tone * gr as f64 + chorus * 0.5) as f32;
        }
    }

    // Glue compression baked into the loop
    let mut glue = Limiter::new(LimiterParams::pulse_glue(), rate);
    glue.process(&mut buffer);
    buffer
}
