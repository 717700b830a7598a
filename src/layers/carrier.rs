//! Binaural carrier pair
//!
//! Two sine generators detuned by the stage's beat frequency, panned hard
//! left and right, with a shared slow vibrato riding on both ear
//! frequencies. This layer is unconditional: if it cannot be built the
//! whole graph fails.

use crate::dsp::{
    pan_gains, AutomatedParam, BlockClock, Limiter, LimiterParams, Modulator, Oscillator,
    RampCurve,
};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::scheduler::{sin_phase_sum, StageField};
use crate::layers::LayerBuild;
use crate::timeline::{binaural_ears, StageRecipe};

const VIBRATO_RATE_HZ: f64 = 0.06;
const VIBRATO_DEPTH_HZ: f64 = 1.6;
const CARRIER_GAIN: f32 = 0.45;
const PAN_SPREAD: f64 = 0.6;

#[derive(Debug)]
pub struct CarrierLayer {
    left_freq: AutomatedParam,
    right_freq: AutomatedParam,
    left: Oscillator,
    right: Oscillator,
    vibrato: Modulator,
    limiter: Limiter,
    /// (left-source, right-source) pan gains, fixed at build
    pan_left: (f32, f32),
    pan_right: (f32, f32),
}

impl CarrierLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate() as f64;
        let origin = build.origin_sec(rate);

        let left_init = build.field_value(StageField::EarLeft, rate);
        let right_init = build.field_value(StageField::EarRight, rate);

        // Phase each ear would hold after a continuous render up to the
        // origin: the stage-tracked ear frequency plus the vibrato's
        // closed-form contribution.
        let vib_phase_cycles =
            VIBRATO_DEPTH_HZ * sin_phase_sum(VIBRATO_RATE_HZ, 0.0, rate, build.origin_frames);
        let left_phase = build.tracked_phase(StageField::EarLeft, rate) + vib_phase_cycles;
        let right_phase = build.tracked_phase(StageField::EarRight, rate) + vib_phase_cycles;

        let vibrato = Modulator::new(
            ctx,
            VIBRATO_RATE_HZ,
            VIBRATO_DEPTH_HZ,
            crate::dsp::lfo_phase(VIBRATO_RATE_HZ, origin),
        );

        Ok(Self {
            left_freq: AutomatedParam::new(left_init),
            right_freq: AutomatedParam::new(right_init),
            left: Oscillator::new(left_phase),
            right: Oscillator::new(right_phase),
            vibrato,
            limiter: Limiter::new(LimiterParams::protective(), rate),
            pan_left: pan_gains(-PAN_SPREAD),
            pan_right: pan_gains(PAN_SPREAD),
        })
    }

    /// Ramp both ears toward a new base/beat pair
    pub fn set_binaural(&mut self, base: f64, beat: f64, when: f64, ramp: f64) {
        let (left, right) = binaural_ears(base, beat);
        self.left_freq.ramp_to(left, when, ramp, RampCurve::Linear);
        self.right_freq.ramp_to(right, when, ramp, RampCurve::Linear);
    }

    /// Pin both ears to exact values at a point in time (offline init)
    pub fn pin_frequencies(&mut self, left: f64, right: f64, at: f64) {
        self.left_freq.set_value_at(left, at);
        self.right_freq.set_value_at(right, at);
    }

    pub fn apply_stage(&mut self, recipe: &StageRecipe, when: f64, ramp: f64) {
        self.set_binaural(recipe.base_frequency, recipe.beat_frequency, when, ramp);
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let vib = self.vibrato.tick(t, dt);
            let left = self.left.tick(self.left_freq.value_at(t) + vib, dt) * CARRIER_GAIN;
            let right = self.right.tick(self.right_freq.value_at(t) + vib, dt) * CARRIER_GAIN;
            l_buf[i] = left * self.pan_left.0 + right * self.pan_right.0;
            r_buf[i] = left * self.pan_left.1 + right * self.pan_right.1;
        }
        self.limiter.process(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::context::Capabilities;
    use crate::events::EventBus;
    use crate::timeline::SessionTimeline;
    use approx::assert_abs_diff_eq;

    fn stage(base: f64, beat: f64) -> StageRecipe {
        StageRecipe {
            name: "test".to_string(),
            base_frequency: base,
            beat_frequency: beat,
            pad_cutoff_hz: 900.0,
            iso_rate_hz: 2.0,
            noise_gain: 0.08,
            deep_sleep_on: false,
        }
    }

    fn ctx(rate: u32) -> RenderContext {
        RenderContext::new(rate, Capabilities::default(), EventBus::new()).unwrap()
    }

    #[test]
    fn test_initial_ears_follow_recipe() {
        let config = EngineConfig::default();
        let recipe = stage(100.0, 4.0);
        let build = LayerBuild {
            initial: &recipe,
            timeline: None,
            origin_frames: 0,
            stage_ramp_sec: 4.0,
            config: &config,
            seed: 1,
        };
        let mut ctx = ctx(8_000);
        let carrier = CarrierLayer::build(&mut ctx, &build).unwrap();
        assert_abs_diff_eq!(carrier.left_freq.value_at(0.0), 98.0);
        assert_abs_diff_eq!(carrier.right_freq.value_at(0.0), 102.0);
    }

    #[test]
    fn test_render_is_stereo_decorrelated() {
        let config = EngineConfig::default();
        let recipe = stage(220.0, 8.0);
        let build = LayerBuild {
            initial: &recipe,
            timeline: None,
            origin_frames: 0,
            stage_ramp_sec: 4.0,
            config: &config,
            seed: 1,
        };
        let mut ctx = ctx(8_000);
        let mut carrier = CarrierLayer::build(&mut ctx, &build).unwrap();

        let mut out = AudioBuffer::new(8_000, ChannelLayout::Stereo, 8_000);
        carrier.render(
            &mut out,
            &BlockClock {
                start_sec: 0.0,
                sample_rate: 8_000.0,
            },
        );

        assert!(out.peak() > 0.1);
        // The two ears run different frequencies: channels must differ
        let diff: f32 = out
            .channel(0)
            .iter()
            .zip(out.channel(1))
            .map(|(l, r)| (l - r).abs())
            .sum();
        assert!(diff > 1.0);
    }

    #[test]
    fn test_chunk_origin_resumes_phase() {
        // Render 2 seconds continuously, then rebuild at a 1-second origin
        // and compare the second half sample-for-sample.
        let config = EngineConfig::default();
        let rate = 4_000u32;
        let timeline =
            SessionTimeline::new(vec![stage(60.0, 4.0), stage(90.0, 6.0)], 8.0).unwrap();

        let build_at = |origin_frames: u64| LayerBuild {
            initial: &timeline.stages[0],
            timeline: Some(&timeline),
            origin_frames,
            stage_ramp_sec: 4.0,
            config: &config,
            seed: 9,
        };

        let mut full = AudioBuffer::new(2 * rate as usize, ChannelLayout::Stereo, rate);
        let mut c = ctx(rate);
        let mut carrier = CarrierLayer::build(&mut c, &build_at(0)).unwrap();
        carrier.render(
            &mut full,
            &BlockClock {
                start_sec: 0.0,
                sample_rate: rate as f64,
            },
        );

        let mut tail = AudioBuffer::new(rate as usize, ChannelLayout::Stereo, rate);
        let mut c2 = ctx(rate);
        let mut resumed = CarrierLayer::build(&mut c2, &build_at(rate as u64)).unwrap();
        resumed.render(
            &mut tail,
            &BlockClock {
                start_sec: 0.0,
                sample_rate: rate as f64,
            },
        );

        for i in 0..rate as usize {
            assert_abs_diff_eq!(
                tail.channel(0)[i],
                full.channel(0)[rate as usize + i],
                epsilon = 1e-4
            );
        }
    }
}
