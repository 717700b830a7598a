//! Broadband noise generation
//!
//! White noise comes straight from the session RNG; pink noise is shaped by
//! the 6-pole Kellet pinking IIR. Noise beds are rendered once into short
//! loop buffers so the live path only pays for playback and gain.

use rand::rngs::StdRng;
use rand::Rng;

/// 6-pole pinking filter (Kellet's refined coefficients)
///
/// Feeding it unit white noise yields -3 dB/octave noise with roughly unit
/// peak after the output scale.
#[derive(Debug, Clone, Default)]
pub struct PinkFilter {
    b: [f64; 7],
}

impl PinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, white: f64) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let out = (b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362) * 0.11;
        b[6] = white * 0.115926;
        out as f32
    }

    pub fn reset(&mut self) {
        self.b = [0.0; 7];
    }
}

/// Render `frames` of white noise in [-1, 1]
pub fn white_loop(rng: &mut StdRng, frames: usize) -> Vec<f32> {
    (0..frames).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Render `frames` of pink noise
pub fn pink_loop(rng: &mut StdRng, frames: usize) -> Vec<f32> {
    let mut filter = PinkFilter::new();
    (0..frames)
        .map(|_| filter.process(rng.gen_range(-1.0..1.0)))
        .collect()
}
