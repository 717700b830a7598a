//! Wind
//!
//! Band-passed white noise with independent slow gain and pan drifts. No
//! stage automation; toggling is the only control.

use std::sync::Arc;

use crate::dsp::{
    lfo_phase, pan_gains, white_loop, Biquad, BiquadKind, BlockClock, Limiter, LimiterParams,
    LoopSource, Modulator,
};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::layers::LayerBuild;

const WIND_LOOP_SEC: f64 = 2.0;
const FILTER_HZ: f64 = 400.0;
const FILTER_Q: f64 = 0.5;
const BASE_GAIN: f64 = 0.15;
const GAIN_LFO_RATE_HZ: f64 = 0.08;
const GAIN_LFO_DEPTH: f64 = 0.3;
const PAN_LFO_RATE_HZ: f64 = 0.05;
const PAN_LFO_DEPTH: f64 = 0.8;

#[derive(Debug)]
pub struct WindLayer {
    source: LoopSource,
    filter: Biquad,
    gain_lfo: Modulator,
    pan_lfo: Modulator,
    limiter: Limiter,
}

impl WindLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate();
        let frames = (WIND_LOOP_SEC * rate as f64).ceil() as u64;
        ctx.reserve_prerender(frames)?;

        let mut rng = build.rng("wind");
        let mut buffer = AudioBuffer::new(frames as usize, ChannelLayout::Mono, rate);
        let samples = white_loop(&mut rng, frames as usize);
        buffer.channel_mut(0).copy_from_slice(&samples);

        let origin = build.origin_sec(rate as f64);
        Ok(Self {
            source: LoopSource::new(Arc::new(buffer), build.origin_frames),
            filter: Biquad::new(BiquadKind::BandPass, FILTER_HZ, FILTER_Q, rate as f64),
            gain_lfo: Modulator::new(
                ctx,
                GAIN_LFO_RATE_HZ,
                GAIN_LFO_DEPTH,
                lfo_phase(GAIN_LFO_RATE_HZ, origin),
            ),
            pan_lfo: Modulator::new(
                ctx,
                PAN_LFO_RATE_HZ,
                PAN_LFO_DEPTH,
                lfo_phase(PAN_LFO_RATE_HZ, origin),
            ),
            limiter: Limiter::new(LimiterParams::protective(), rate as f64),
        })
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let filtered = self.filter.process(self.source.tick().0 as f64);
            let gain = (BASE_GAIN + self.gain_lfo.tick(t, dt)) as f32;
            let (gl, gr) = pan_gains(self.pan_lfo.tick(t, dt));
            let s = filtered * gain;
            l_buf[i] = s * gl;
            r_buf[i] = s * gr;
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
    use crate::timeline::StageRecipe;

    #[test]
    fn test_wind_is_band_limited_and_drifts() {
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
            origin_frames: 0,
            stage_ramp_sec: 4.0,
            config: &config,
            seed: 4,
        };
        let mut ctx = RenderContext::new(8_000, Capabilities::default(), EventBus::new()).unwrap();
        let mut wind = WindLayer::build(&mut ctx, &build).unwrap();

        let mut out = AudioBuffer::new(16_000, ChannelLayout::Stereo, 8_000);
        wind.render(
            &mut out,
            &BlockClock {
                start_sec: 0.0,
                sample_rate: 8_000.0,
            },
        );

        assert!(out.peak() > 0.001);
        // Pan drift: left/right energy balance shifts over the render
        let half = 8_000usize;
        let energy = |ch: usize, range: std::ops::Range<usize>| -> f32 {
            out.channel(ch)[range].iter().map(|s| s * s).sum()
        };
        let early_ratio = energy(0, 0..half) / energy(1, 0..half).max(1e-12);
        let late_ratio = energy(0, half..2 * half) / energy(1, half..2 * half).max(1e-12);
        assert!((early_ratio - late_ratio).abs() > 1e-3);
    }
}
