//! Phase-controlled low-frequency modulators
//!
//! Every slow wobble in the soundscape (vibrato, pan drift, amplitude
//! swells, isochronic gating) is a [`Modulator`]. The implementation is
//! polymorphic over the context's capability probe: the phase-controlled
//! variant honors an explicit start phase so an offline chunk can resume a
//! modulation mid-cycle; the fallback variant is an ordinary generator plus
//! scaler with identical frequency/amplitude semantics but no start-phase
//! accuracy. Both expose the same automation contract.

use crate::dsp::osc::Oscillator;
use crate::dsp::param::{AutomatedParam, RampCurve};
use crate::engine::context::{ModulatorMode, RenderContext};

/// Phase an oscillation of constant `rate_hz` holds after `offset_sec`
/// of continuous running, in cycles
#[inline]
pub fn lfo_phase(rate_hz: f64, offset_sec: f64) -> f64 {
    (rate_hz * offset_sec).fract()
}

/// A sine LFO with automatable frequency and amplitude
#[derive(Debug, Clone)]
pub struct Modulator {
    mode: ModulatorMode,
    osc: Oscillator,
    frequency: AutomatedParam,
    amplitude: AutomatedParam,
}

impl Modulator {
    /// Build an LFO on the given context
    ///
    /// `start_phase_cycles` is honored only when the context resolved the
    /// phase-controlled processor; the fallback always starts at phase zero.
    pub fn new(
        ctx: &mut RenderContext,
        frequency_hz: f64,
        amplitude: f64,
        start_phase_cycles: f64,
    ) -> Self {
        let mode = ctx.modulator_mode();
        let phase = match mode {
            ModulatorMode::PhaseControlled => start_phase_cycles,
            ModulatorMode::Fallback => 0.0,
        };
        Self {
            mode,
            osc: Oscillator::new(phase),
            frequency: AutomatedParam::new(frequency_hz),
            amplitude: AutomatedParam::new(amplitude),
        }
    }

    pub fn mode(&self) -> ModulatorMode {
        self.mode
    }

    /// Ramp the modulation rate to `hz`
    pub fn set_frequency(&mut self, hz: f64, when: f64, ramp: f64) {
        self.frequency.ramp_to(hz, when, ramp, RampCurve::Linear);
    }

    /// Pin the modulation rate at a point in time
    pub fn set_frequency_at(&mut self, hz: f64, when: f64) {
        self.frequency.set_value_at(hz, when);
    }

    /// Ramp the modulation depth
    pub fn set_amplitude(&mut self, amplitude: f64, when: f64, ramp: f64) {
        self.amplitude.ramp_to(amplitude, when, ramp, RampCurve::Linear);
    }

    /// Current frequency value (for schedulers that need to read back)
    pub fn frequency_at(&self, t: f64) -> f64 {
        self.frequency.value_at(t)
    }

    /// Emit the modulation sample for time `t`, then advance one sample
    #[inline]
    pub fn tick(&mut self, t: f64, dt: f64) -> f64 {
        let amp = self.amplitude.value_at(t);
        amp * self.osc.tick(self.frequency.value_at(t), dt) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::Capabilities;
    use crate::events::EventBus;
    use approx::assert_abs_diff_eq;

    fn ctx(phase_modulators: bool) -> RenderContext {
        RenderContext::new(
            1_000,
            Capabilities {
                phase_modulators,
                ..Capabilities::default()
            },
            EventBus::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_lfo_phase_wraps() {
        assert_abs_diff_eq!(lfo_phase(0.06, 0.0), 0.0);
        assert_abs_diff_eq!(lfo_phase(0.25, 5.0), 0.25);
        assert_abs_diff_eq!(lfo_phase(1.0, 7.75), 0.75);
    }

    #[test]
    fn test_phase_controlled_honors_start_phase() {
        let mut ctx = ctx(true);
        // Quarter cycle in: first sample sits at the positive peak
        let mut lfo = Modulator::new(&mut ctx, 2.0, 1.6, 0.25);
        assert_abs_diff_eq!(lfo.tick(0.0, 0.001), 1.6, epsilon = 1e-9);
    }

    #[test]
    fn test_fallback_ignores_start_phase() {
        let mut ctx = ctx(false);
        let mut lfo = Modulator::new(&mut ctx, 2.0, 1.6, 0.25);
        assert_eq!(lfo.mode(), ModulatorMode::Fallback);
        assert_abs_diff_eq!(lfo.tick(0.0, 0.001), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frequency_ramp_changes_rate() {
        let mut ctx = ctx(true);
        let mut lfo = Modulator::new(&mut ctx, 1.0, 1.0, 0.0);
        lfo.set_frequency(4.0, 0.5, 0.0);

        let dt = 0.001;
        let mut t = 0.0;
        for _ in 0..1_000 {
            lfo.tick(t, dt);
            t += dt;
        }
        // Half a second at 1 Hz plus half a second at 4 Hz: 2.5 cycles total
        assert_abs_diff_eq!(lfo.osc.phase(), 0.5, epsilon = 1e-3);
    }
}
