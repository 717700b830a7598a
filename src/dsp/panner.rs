//! Stereo panning
//!
//! Equal-power pan law for mono sources, matching the host-platform panner
//! the soundscape voicing was tuned against: pan -1 is hard left, +1 hard
//! right, 0 splits the signal at -3 dB per side.

/// Left/right gains for a pan position in [-1, 1]
#[inline]
pub fn pan_gains(pan: f64) -> (f32, f32) {
    let x = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5 * std::f64::consts::FRAC_PI_2;
    (x.cos() as f32, x.sin() as f32)
}
