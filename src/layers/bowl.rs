//! Singing-bowl resonance
//!
//! Five harmonically-related partials with small per-partial vibrato, summed
//! into one strike envelope and drifted across the stereo field. The layer
//! has no continuous output of its own: strikes are triggered by the
//! session's look-ahead scheduler (live) or laid out along the timeline by
//! the offline pipeline. The envelope is always ramped — a short dip to
//! silence, a 0.2 s attack, then a long exponential decay — never stepped,
//! so re-strikes cannot click.

use rand::Rng;

use crate::config::MIN_GAIN;
use crate::dsp::{
    lfo_phase, pan_gains, AutomatedParam, BlockClock, Limiter, LimiterParams, Modulator,
    Oscillator, RampCurve,
};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::layers::LayerBuild;

const FUNDAMENTAL_HZ: f64 = 90.0;
const PARTIALS: [(f64, f64); 5] = [
    (1.0, 1.0),
    (2.005, 0.7),
    (3.42, 0.55),
    (4.0, 0.25),
    (5.71, 0.35),
];
const MAIN_GAIN: f64 = 0.35;
const PAN_LFO_RATE_HZ: f64 = 0.025;
const PAN_LFO_DEPTH: f64 = 0.9;
/// Strike envelope timing
const SILENCE_RAMP_SEC: f64 = 0.01;
const ATTACK_SEC: f64 = 0.2;
const DECAY_SEC: f64 = 45.0;

#[derive(Debug)]
struct Partial {
    osc: Oscillator,
    freq_hz: f64,
    gain: f64,
    vibrato: Modulator,
}

#[derive(Debug)]
pub struct BowlLayer {
    partials: Vec<Partial>,
    envelope: AutomatedParam,
    pan_lfo: Modulator,
    limiter: Limiter,
    loop_active: bool,
}

impl BowlLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate() as f64;
        let origin = build.origin_sec(rate);
        let mut rng = build.rng("bowl");

        let partials = PARTIALS
            .iter()
            .map(|&(ratio, gain)| {
                let freq_hz = FUNDAMENTAL_HZ * ratio;
                let vib_rate = 2.5 + rng.gen_range(0.0..2.0);
                let vibrato = Modulator::new(
                    ctx,
                    vib_rate,
                    freq_hz * 0.004,
                    lfo_phase(vib_rate, origin),
                );
                Partial {
                    osc: Oscillator::new(lfo_phase(freq_hz, origin)),
                    freq_hz,
                    gain,
                    vibrato,
                }
            })
            .collect();

        Ok(Self {
            partials,
            envelope: AutomatedParam::new(0.0),
            pan_lfo: Modulator::new(
                ctx,
                PAN_LFO_RATE_HZ,
                PAN_LFO_DEPTH,
                lfo_phase(PAN_LFO_RATE_HZ, origin),
            ),
            limiter: Limiter::new(LimiterParams::protective(), rate),
            loop_active: false,
        })
    }

    /// Schedule one strike at local time `t`
    pub fn trigger(&mut self, t: f64) {
        self.envelope.ramp_to(0.0, t, SILENCE_RAMP_SEC, RampCurve::Linear);
        self.envelope.ramp_to(
            1.0,
            t + SILENCE_RAMP_SEC,
            ATTACK_SEC - SILENCE_RAMP_SEC,
            RampCurve::Linear,
        );
        self.envelope.ramp_to(
            MIN_GAIN,
            t + ATTACK_SEC,
            DECAY_SEC - ATTACK_SEC,
            RampCurve::Exponential,
        );
    }

    /// Mark the self-scheduling strike loop running
    pub fn start_loop(&mut self) {
        self.loop_active = true;
    }

    /// Stop striking and fade the current resonance out
    pub fn stop_loop(&mut self, t: f64) {
        self.loop_active = false;
        self.envelope.ramp_to(0.0, t, 0.5, RampCurve::Linear);
    }

    pub fn loop_active(&self) -> bool {
        self.loop_active
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let mut sum = 0.0f64;
            for partial in &mut self.partials {
                let freq = partial.freq_hz + partial.vibrato.tick(t, dt);
                sum += partial.osc.tick(freq, dt) as f64 * partial.gain;
            }
            let s = sum * self.envelope.value_at(t) * MAIN_GAIN;
            let (gl, gr) = pan_gains(self.pan_lfo.tick(t, dt));
            l_buf[i] = (s * gl as f64) as f32;
            r_buf[i] = (s * gr as f64) as f32;
        }
        self.limiter.process(out);
    }
}
