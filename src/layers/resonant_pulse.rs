//! Resonant pulse
//!
//! A continuous dual-tone drone: two harmonically-spaced fundamentals, each
//! thickened by a chorus-detuned partner oscillator, breathing under a slow
//! swell LFO while a very slow sweep LFO bends both fundamentals a few hertz
//! either way. Unlike the brain pulse this layer runs live — its oscillators
//! never land in a cached buffer.

use crate::dsp::{lfo_phase, BlockClock, Limiter, LimiterParams, Modulator, Oscillator};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::scheduler::sin_phase_sum;
use crate::layers::LayerBuild;

/// Fundamental and mix gain of each tone (a fifth apart)
const TONES: [(f64, f64); 2] = [(110.0, 0.5), (165.0, 0.35)];
const DETUNE: f64 = 0.004;
const SWELL_BASE: f64 = 0.4;
const SWELL_RATE_HZ: f64 = 0.05;
const SWELL_DEPTH: f64 = 0.3;
const SWEEP_RATE_HZ: f64 = 0.01;
const SWEEP_DEPTH_HZ: f64 = 2.0;

#[derive(Debug)]
struct Tone {
    low: Oscillator,
    high: Oscillator,
    freq_hz: f64,
    gain: f64,
}

#[derive(Debug)]
pub struct ResonantPulseLayer {
    tones: Vec<Tone>,
    swell: Modulator,
    sweep: Modulator,
    limiter: Limiter,
}

impl ResonantPulseLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate() as f64;
        let origin = build.origin_sec(rate);

        // Sweep contribution to each oscillator's inherited phase, scaled by
        // that oscillator's detune factor
        let sweep_cycles =
            SWEEP_DEPTH_HZ * sin_phase_sum(SWEEP_RATE_HZ, 0.0, rate, build.origin_frames);

        let tones = TONES
            .iter()
            .map(|&(freq_hz, gain)| {
                let lo = 1.0 - DETUNE;
                let hi = 1.0 + DETUNE;
                Tone {
                    low: Oscillator::new(lo * (freq_hz * origin + sweep_cycles)),
                    high: Oscillator::new(hi * (freq_hz * origin + sweep_cycles)),
                    freq_hz,
                    gain,
                }
            })
            .collect();

        Ok(Self {
            tones,
            swell: Modulator::new(
                ctx,
                SWELL_RATE_HZ,
                SWELL_DEPTH,
                lfo_phase(SWELL_RATE_HZ, origin),
            ),
            sweep: Modulator::new(
                ctx,
                SWEEP_RATE_HZ,
                SWEEP_DEPTH_HZ,
                lfo_phase(SWEEP_RATE_HZ, origin),
            ),
            limiter: Limiter::new(LimiterParams::protective(), rate),
        })
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let swell = SWELL_BASE + self.swell.tick(t, dt);
            let bend = self.sweep.tick(t, dt);

            let mut sum = 0.0f64;
            for tone in &mut self.tones {
                let f = tone.freq_hz + bend;
                let low = tone.low.tick(f * (1.0 - DETUNE), dt) as f64;
                let high = tone.high.tick(f * (1.0 + DETUNE), dt) as f64;
                sum += (low + high) * 0.5 * tone.gain;
            }
            let s = (sum * swell) as f32;
            l_buf[i] = s;
            r_buf[i] = s;
        }
        self.limiter.process(out);
    }
}
