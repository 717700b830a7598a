//! Output limiter
//!
//! Threshold/knee/ratio dynamics stage with fast attack and smooth release,
//! applied to every layer's output so no single voice can clip the mix.
//! Gain reduction is computed on the per-frame peak across channels and the
//! same gain is applied to all channels, preserving the stereo image.

use crate::engine::buffer::{db_to_linear, linear_to_db, AudioBuffer};

/// Envelope coefficient for a time constant
#[inline]
fn time_to_coeff(time_sec: f64, sample_rate: f64) -> f32 {
    if time_sec <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_sec * sample_rate)).exp() as f32
    }
}

/// Dynamics parameters (threshold/knee/ratio/attack/release)
#[derive(Debug, Clone, Copy)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_sec: f64,
    pub release_sec: f64,
}

impl LimiterParams {
    /// The per-layer protection setting: bit-transparent below -2 dBFS,
    /// firm on envelope peaks
    pub fn protective() -> Self {
        Self {
            threshold_db: -1.0,
            knee_db: 2.0,
            ratio: 20.0,
            attack_sec: 0.003,
            release_sec: 0.25,
        }
    }

    /// The glue setting baked into the brain-pulse loop pre-render
    pub fn pulse_glue() -> Self {
        Self {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack_sec: 0.003,
            release_sec: 0.25,
        }
    }
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self::protective()
    }
}

/// Envelope-follower limiter
#[derive(Debug, Clone)]
pub struct Limiter {
    params: LimiterParams,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB (>= 0)
    envelope: f32,
}

impl Limiter {
    pub fn new(params: LimiterParams, sample_rate: f64) -> Self {
        Self {
            params,
            attack_coeff: time_to_coeff(params.attack_sec, sample_rate),
            release_coeff: time_to_coeff(params.release_sec, sample_rate),
            envelope: 0.0,
        }
    }

    /// Static gain-computer curve: reduction (dB) for an input level (dB)
    fn reduction_db(&self, level_db: f32) -> f32 {
        let p = &self.params;
        let over = level_db - p.threshold_db;
        let half_knee = p.knee_db * 0.5;

        let out_db = if over <= -half_knee {
            level_db
        } else if over < half_knee {
            let t = over + half_knee;
            level_db + (1.0 / p.ratio - 1.0) * t * t / (2.0 * p.knee_db)
        } else {
            p.threshold_db + over / p.ratio
        };
        (level_db - out_db).max(0.0)
    }

    /// Process a buffer in place
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.channels();
        let frames = buffer.len();
        for i in 0..frames {
            let mut peak = 0.0f32;
            for ch in 0..channels {
                peak = peak.max(buffer.channel(ch)[i].abs());
            }

            let target = if peak > 0.0 {
                self.reduction_db(linear_to_db(peak))
            } else {
                0.0
            };

            let coeff = if target > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * target;

            if self.envelope > 0.0 {
                let gain = db_to_linear(-self.envelope);
                for ch in 0..channels {
                    buffer.channel_mut(ch)[i] *= gain;
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
