//! Periodic signal generators
//!
//! Phase-accumulator oscillators with phase kept in cycles and wrapped every
//! sample. Keeping the accumulator in [0, 1) bounds float rounding drift so
//! a reconstructed start phase stays accurate over very long renders.

/// Fixed harmonic series evaluated at a given phase
///
/// Wraps the enriched periodic waveform used by the percussive loop: a small
/// set of cosine partials with alternating-sign 1/k² weights, which gives a
/// soft membrane-like attack when enveloped.
#[derive(Debug, Clone)]
pub struct Wavetable {
    /// (harmonic number, amplitude) pairs
    partials: Vec<(f64, f64)>,
}

impl Wavetable {
    /// The drum timbre: odd cosine harmonics, alternating sign, 1/k² rolloff
    pub fn drum() -> Self {
        let mut partials = Vec::new();
        for k in (1..32usize).step_by(2) {
            let sign = if ((k - 1) / 2) % 2 == 0 { 1.0 } else { -1.0 };
            partials.push((k as f64, sign / (k * k) as f64));
        }
        Self { partials }
    }

    /// Evaluate the waveform at `phase` cycles
    pub fn sample(&self, phase: f64) -> f32 {
        let theta = std::f64::consts::TAU * phase;
        self.partials
            .iter()
            .map(|&(k, a)| a * (k * theta).cos())
            .sum::<f64>() as f32
    }
}

/// Sine (or wavetable) oscillator with explicit phase
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Phase in cycles, wrapped to [0, 1)
    phase: f64,
}

impl Oscillator {
    pub fn new(start_phase_cycles: f64) -> Self {
        Self {
            phase: start_phase_cycles.rem_euclid(1.0),
        }
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Emit the current sine sample, then advance by `freq * dt` cycles
    #[inline]
    pub fn tick(&mut self, freq: f64, dt: f64) -> f32 {
        let out = (std::f64::consts::TAU * self.phase).sin() as f32;
        self.advance(freq, dt);
        out
    }

    /// Emit the current wavetable sample, then advance
    #[inline]
    pub fn tick_table(&mut self, table: &Wavetable, freq: f64, dt: f64) -> f32 {
        let out = table.sample(self.phase);
        self.advance(freq, dt);
        out
    }

    #[inline]
    fn advance(&mut self, freq: f64, dt: f64) {
        self.phase += freq * dt;
        self.phase -= self.phase.floor();
    }
}
