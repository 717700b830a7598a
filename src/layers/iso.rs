//! Isochronic tone
//!
//! A steady 80 Hz tone whose gain is gated by a stage-controlled LFO around
//! a constant base level, producing the regular on/off pulse isochronic
//! entrainment uses. The gating rate is the automatable parameter.

use crate::dsp::{lfo_phase, BlockClock, Limiter, LimiterParams, Modulator, Oscillator};
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::RenderContext;
use crate::error::Result;
use crate::graph::scheduler::StageField;
use crate::layers::LayerBuild;
use crate::timeline::StageRecipe;

const TONE_HZ: f64 = 80.0;
const GATE_BASE: f64 = 0.5;
const GATE_DEPTH: f64 = 0.4;

#[derive(Debug)]
pub struct IsoLayer {
    tone: Oscillator,
    gate: Modulator,
    limiter: Limiter,
}

impl IsoLayer {
    pub fn build(ctx: &mut RenderContext, build: &LayerBuild) -> Result<Self> {
        let rate = ctx.sample_rate() as f64;
        let origin = build.origin_sec(rate);

        let rate_init = build.field_value(StageField::IsoRate, rate);
        // The gate rate ramps with stages, so its inherited phase is the
        // exact per-sample sum of the tracked rate, not rate * offset.
        let gate_phase = build.tracked_phase(StageField::IsoRate, rate);
        let gate = Modulator::new(ctx, rate_init, GATE_DEPTH, gate_phase.fract());

        Ok(Self {
            tone: Oscillator::new(lfo_phase(TONE_HZ, origin)),
            gate,
            limiter: Limiter::new(LimiterParams::protective(), rate),
        })
    }

    pub fn set_rate(&mut self, hz: f64, when: f64, ramp: f64) {
        self.gate.set_frequency(hz, when, ramp);
    }

    pub fn pin_rate(&mut self, hz: f64, at: f64) {
        self.gate.set_frequency_at(hz, at);
    }

    pub fn apply_stage(&mut self, recipe: &StageRecipe, when: f64, ramp: f64) {
        self.set_rate(recipe.iso_rate_hz, when, ramp);
    }

    pub fn render(&mut self, out: &mut AudioBuffer, clock: &BlockClock) {
        let dt = clock.dt();
        let frames = out.len();
        let (l_buf, r_buf) = out.stereo_mut();
        for i in 0..frames {
            let t = clock.t(i);
            let gain = GATE_BASE + self.gate.tick(t, dt);
            let s = self.tone.tick(TONE_HZ, dt) * gain as f32;
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
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::context::Capabilities;
    use crate::events::EventBus;

    fn recipe(iso: f64) -> StageRecipe {
        StageRecipe {
            name: "test".to_string(),
            base_frequency: 55.0,
            beat_frequency: 2.5,
            pad_cutoff_hz: 900.0,
            iso_rate_hz: iso,
            noise_gain: 0.08,
            deep_sleep_on: false,
        }
    }

    #[test]
    fn test_gate_modulates_amplitude() {
        let config = EngineConfig::default();
        let stage = recipe(2.0);
        let build = LayerBuild {
            initial: &stage,
            timeline: None,
            origin_frames: 0,
            stage_ramp_sec: 4.0,
            config: &config,
            seed: 1,
        };
        let mut ctx = RenderContext::new(8_000, Capabilities::default(), EventBus::new()).unwrap();
        let mut layer = IsoLayer::build(&mut ctx, &build).unwrap();

        let mut out = AudioBuffer::new(8_000, ChannelLayout::Stereo, 8_000);
        layer.render(
            &mut out,
            &BlockClock {
                start_sec: 0.0,
                sample_rate: 8_000.0,
            },
        );

        // 2 Hz gate: the gate peaks a quarter cycle in (0.125 s) and dips at
        // 0.375 s. Compare local RMS around those points.
        let rms = |range: std::ops::Range<usize>| -> f32 {
            let slice = &out.channel(0)[range];
            (slice.iter().map(|s| s * s).sum::<f32>() / slice.len() as f32).sqrt()
        };
        let peak_rms = rms(900..1_100);
        let dip_rms = rms(2_900..3_100);
        assert!(peak_rms > dip_rms * 3.0, "peak {} dip {}", peak_rms, dip_rms);
    }
}
