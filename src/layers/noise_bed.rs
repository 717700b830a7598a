//! Pink-noise bed
//!
//! Two seconds of pink noise rendered once and looped; the stage scheduler
//! automates nothing but its gain.

use std::sync::Arc;

use crate::dsp::{
    pink_loop, AutomatedParam, BlockClock, Limiter, LimiterParams, LoopSource, RampCurve,
};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::scheduler::StageField;
use crate::layers::LayerBuild;
use crate::timeline::StageRecipe;

const NOISE_LOOP_SEC: f64 = 2.0;

#[derive(Debug)]
pub struct NoiseBedLayer {
    source: LoopSource,
    gain: AutomatedParam,
    limiter: Limiter,
}

impl NoiseBedLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate();
        let frames = (NOISE_LOOP_SEC * rate as f64).ceil() as u64;
        ctx.reserve_prerender(frames)?;

        let mut rng = build.rng("noise");
        let mut buffer = AudioBuffer::new(frames as usize, ChannelLayout::Mono, rate);
        let samples = pink_loop(&mut rng, frames as usize);
        buffer.channel_mut(0).copy_from_slice(&samples);

        Ok(Self {
            source: LoopSource::new(Arc::new(buffer), build.origin_frames),
            gain: AutomatedParam::new(build.field_value(StageField::NoiseGain, rate as f64)),
            limiter: Limiter::new(LimiterParams::protective(), rate as f64),
        })
    }

    pub fn set_gain(&mut self, gain: f64, when: f64, ramp: f64) {
        self.gain.ramp_to(gain, when, ramp, RampCurve::Linear);
    }

    pub fn pin_gain(&mut self, gain: f64, at: f64) {
        self.gain.set_value_at(gain, at);
    }

    pub fn apply_stage(&mut self, recipe: &StageRecipe, when: f64, ramp: f64) {
        self.set_gain(recipe.noise_gain, when, ramp);
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let s = self.source.tick().0 * self.gain.value_at(clock.t(i)) as f32;
            l_buf[i] = s;
            r_buf[i] = s;
        }
        self.limiter.process(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::context::Capabilities;
    use crate::events::EventBus;

    fn build_layer(seed: u64, origin_frames: u64) -> NoiseBedLayer {
        let config = EngineConfig::default();
        let stage = StageRecipe {
            name: "test".to_string(),
            base_frequency: 55.0,
            beat_frequency: 2.5,
            pad_cutoff_hz: 900.0,
            iso_rate_hz: 2.0,
            noise_gain: 0.08,
            deep_sleep_on: false,
        };
        let build = LayerBuild {
            initial: &stage,
            timeline: None,
            origin_frames,
            stage_ramp_sec: 4.0,
            config: &config,
            seed,
        };
        let mut ctx = RenderContext::new(8_000, Capabilities::default(), EventBus::new()).unwrap();
        NoiseBedLayer::build(&mut ctx, &build).unwrap()
    }

    #[test]
    fn test_gain_scales_output() {
        let mut layer = build_layer(3, 0);
        let clock = BlockClock {
            start_sec: 0.0,
            sample_rate: 8_000.0,
        };

        let mut quiet = AudioBuffer::new(1_024, ChannelLayout::Stereo, 8_000);
        layer.render(&mut quiet, &clock);
        let quiet_peak = quiet.peak();

        let mut loud_layer = build_layer(3, 0);
        loud_layer.pin_gain(0.8, 0.0);
        let mut loud = AudioBuffer::new(1_024, ChannelLayout::Stereo, 8_000);
        loud_layer.render(&mut loud, &clock);

        assert!(loud.peak() > quiet_peak * 5.0);
    }

    #[test]
    fn test_origin_offsets_into_loop() {
        let mut a = build_layer(3, 0);
        let clock = BlockClock {
            start_sec: 0.0,
            sample_rate: 8_000.0,
        };
        let mut first = AudioBuffer::new(2_048, ChannelLayout::Stereo, 8_000);
        a.render(&mut first, &clock);

        // Same seed, origin 1024 frames in: output matches the shifted loop
        let mut b = build_layer(3, 1_024);
        let mut shifted = AudioBuffer::new(1_024, ChannelLayout::Stereo, 8_000);
        b.render(&mut shifted, &clock);

        assert_eq!(&first.channel(0)[1_024..2_048], &shifted.channel(0)[..]);
    }
}
