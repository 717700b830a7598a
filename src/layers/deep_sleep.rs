//! Deep-sleep binaural
//!
//! A low-frequency carrier pair an octave below the main carrier, pulsed by
//! an amplitude LFO whose rate tracks the stage's beat frequency, and swept
//! through the stereo field by a pair of inverted pan LFOs (the right panner
//! mirrors the left) for a slow rotating sensation. The layer's audibility
//! gate follows each stage's `deep_sleep_on` flag with a ramp, so stages can
//! bring it in and out without clicks.

use crate::dsp::{
    lfo_phase, pan_gains, AutomatedParam, BlockClock, Limiter, LimiterParams, Modulator,
    Oscillator, RampCurve,
};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::scheduler::{stage_target, StageField};
use crate::layers::LayerBuild;
use crate::timeline::StageRecipe;

const PULSE_LFO_DEPTH: f64 = 0.1;
const PAN_LFO_RATE_HZ: f64 = 0.015;
const PAN_LFO_DEPTH: f64 = 1.0;

#[derive(Debug)]
pub struct DeepSleepLayer {
    left_freq: AutomatedParam,
    right_freq: AutomatedParam,
    left: Oscillator,
    right: Oscillator,
    pulse: Modulator,
    pan_lfo: Modulator,
    /// Stage-driven audibility gate (0 or 1, always ramped)
    active_gain: AutomatedParam,
    gain: f64,
    limiter: Limiter,
}

impl DeepSleepLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate() as f64;
        let origin = build.origin_sec(rate);

        let left_init = build.field_value(StageField::DeepEarLeft, rate);
        let right_init = build.field_value(StageField::DeepEarRight, rate);
        let pulse_init = build.field_value(StageField::DeepPulseRate, rate);
        let active_init = build.field_value(StageField::DeepSleepGain, rate);

        let pulse = Modulator::new(
            ctx,
            pulse_init,
            PULSE_LFO_DEPTH,
            build.tracked_phase(StageField::DeepPulseRate, rate).fract(),
        );

        Ok(Self {
            left_freq: AutomatedParam::new(left_init),
            right_freq: AutomatedParam::new(right_init),
            left: Oscillator::new(build.tracked_phase(StageField::DeepEarLeft, rate)),
            right: Oscillator::new(build.tracked_phase(StageField::DeepEarRight, rate)),
            pulse,
            pan_lfo: Modulator::new(
                ctx,
                PAN_LFO_RATE_HZ,
                PAN_LFO_DEPTH,
                lfo_phase(PAN_LFO_RATE_HZ, origin),
            ),
            active_gain: AutomatedParam::new(active_init),
            gain: build.config.deep_sleep_gain_multiplier,
            limiter: Limiter::new(LimiterParams::protective(), rate),
        })
    }

    pub fn apply_stage(&mut self, recipe: &StageRecipe, when: f64, ramp: f64) {
        self.left_freq.ramp_to(
            stage_target(recipe, StageField::DeepEarLeft),
            when,
            ramp,
            RampCurve::Linear,
        );
        self.right_freq.ramp_to(
            stage_target(recipe, StageField::DeepEarRight),
            when,
            ramp,
            RampCurve::Linear,
        );
        self.pulse
            .set_frequency(stage_target(recipe, StageField::DeepPulseRate), when, ramp);
        self.active_gain.ramp_to(
            stage_target(recipe, StageField::DeepSleepGain),
            when,
            ramp,
            RampCurve::Linear,
        );
    }

    /// Pin every stage-automated value at a point in time (offline init)
    pub fn pin_stage(&mut self, left: f64, right: f64, pulse_hz: f64, active: f64, at: f64) {
        self.left_freq.set_value_at(left, at);
        self.right_freq.set_value_at(right, at);
        self.pulse.set_frequency_at(pulse_hz, at);
        self.active_gain.set_value_at(active, at);
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let gate = self.active_gain.value_at(t);
            let gain = (self.gain + self.pulse.tick(t, dt)) * gate;

            let pan = self.pan_lfo.tick(t, dt);
            let (ll, lr) = pan_gains(pan);
            let (rl, rr) = pan_gains(-pan);

            let left = self.left.tick(self.left_freq.value_at(t), dt) as f64;
            let right = self.right.tick(self.right_freq.value_at(t), dt) as f64;

            l_buf[i] = ((left * ll as f64 + right * rl as f64) * gain) as f32;
            r_buf[i] = ((left * lr as f64 + right * rr as f64) * gain) as f32;
        }
        self.limiter.process(out);
    }
}
