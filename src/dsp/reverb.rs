//! Shared reverberator
//!
//! A multi-tap convolution against an exponentially-decaying noise impulse:
//! tap positions and amplitudes are drawn once from the session RNG, the
//! amplitudes follow `(1 - t/duration)^decay`, and each output channel gets
//! its own tap set for stereo decorrelation. The send bus is mixed to mono
//! before the tap sum.

use rand::rngs::StdRng;
use rand::Rng;

use crate::engine::buffer::AudioBuffer;
use crate::error::{DriftwaveError, Result};

/// Impulse shape for the shared reverb
#[derive(Debug, Clone)]
pub struct ReverbParams {
    /// Impulse (tail) length in seconds
    pub duration_sec: f64,
    /// Decay exponent of the amplitude envelope
    pub decay: f64,
    /// Tap density per second of impulse, per channel
    pub taps_per_second: usize,
    /// Wet output level after energy normalization
    pub wet: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            duration_sec: 3.0,
            decay: 2.0,
            taps_per_second: 24,
            wet: 0.25,
        }
    }
}

impl ReverbParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.duration_sec > 0.0) {
            return Err(DriftwaveError::InvalidParameter {
                param: "duration_sec",
                value: self.duration_sec.to_string(),
                expected: "a positive impulse length",
            });
        }
        if self.taps_per_second == 0 {
            return Err(DriftwaveError::InvalidParameter {
                param: "taps_per_second",
                value: "0".to_string(),
                expected: "at least one tap per second",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Tap {
    delay: usize,
    gain: f32,
}

/// Multi-tap reverberator over a mono input history ring
#[derive(Debug)]
pub struct Reverb {
    taps: [Vec<Tap>; 2],
    history: Vec<f32>,
    mask: usize,
    write: usize,
}

impl Reverb {
    pub fn new(params: &ReverbParams, sample_rate: u32, rng: &mut StdRng) -> Result<Self> {
        params.validate()?;
        let impulse_len = (params.duration_sec * sample_rate as f64).ceil() as usize;
        let ring_len = (impulse_len + 1).next_power_of_two();

        let tap_count = (params.taps_per_second as f64 * params.duration_sec).ceil() as usize;
        let mut taps: [Vec<Tap>; 2] = [Vec::new(), Vec::new()];
        for channel in &mut taps {
            let mut energy = 0.0f64;
            for _ in 0..tap_count {
                let delay = rng.gen_range(0..impulse_len);
                let env = (1.0 - delay as f64 / impulse_len as f64).powf(params.decay);
                let gain = (rng.gen_range(-1.0..1.0f64) * env) as f32;
                energy += (gain as f64) * (gain as f64);
                channel.push(Tap { delay, gain });
            }
            let norm = if energy > 0.0 {
                params.wet / energy.sqrt() as f32
            } else {
                0.0
            };
            for tap in channel.iter_mut() {
                tap.gain *= norm;
            }
        }

        Ok(Self {
            taps,
            history: vec![0.0; ring_len],
            mask: ring_len - 1,
            write: 0,
        })
    }

    /// Convolve `input` and accumulate the wet signal into `out`
    ///
    /// `input` and `out` must be stereo and equally long.
    pub fn process_into(&mut self, input: &AudioBuffer, out: &mut AudioBuffer, return_gain: f32) {
        let frames = input.len().min(out.len());
        for i in 0..frames {
            let mono = 0.5 * (input.channel(0)[i] + input.channel(1)[i]);
            self.history[self.write] = mono;

            if return_gain != 0.0 {
                for (ch, taps) in self.taps.iter().enumerate() {
                    let mut acc = 0.0f32;
                    for tap in taps {
                        acc += tap.gain * self.history[(self.write.wrapping_sub(tap.delay)) & self.mask];
                    }
                    out.channel_mut(ch)[i] += acc * return_gain;
                }
            }

            self.write = (self.write + 1) & self.mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use rand::SeedableRng;

    fn impulse_input(frames: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::new(frames, ChannelLayout::Stereo, 8_000);
        buf.channel_mut(0)[0] = 1.0;
        buf.channel_mut(1)[0] = 1.0;
        buf
    }

    #[test]
    fn test_deterministic_for_seed() {
        let params = ReverbParams::default();
        let mut a = Reverb::new(&params, 8_000, &mut StdRng::seed_from_u64(3)).unwrap();
        let mut b = Reverb::new(&params, 8_000, &mut StdRng::seed_from_u64(3)).unwrap();

        let input = impulse_input(4_096);
        let mut out_a = AudioBuffer::new(4_096, ChannelLayout::Stereo, 8_000);
        let mut out_b = AudioBuffer::new(4_096, ChannelLayout::Stereo, 8_000);
        a.process_into(&input, &mut out_a, 1.0);
        b.process_into(&input, &mut out_b, 1.0);

        assert_eq!(out_a.channel(0), out_b.channel(0));
        assert_eq!(out_a.channel(1), out_b.channel(1));
    }

    #[test]
    fn test_tail_decays() {
        let params = ReverbParams {
            duration_sec: 0.5,
            ..ReverbParams::default()
        };
        let mut reverb = Reverb::new(&params, 8_000, &mut StdRng::seed_from_u64(11)).unwrap();

        let input = impulse_input(8_000);
        let mut out = AudioBuffer::new(8_000, ChannelLayout::Stereo, 8_000);
        reverb.process_into(&input, &mut out, 1.0);

        let early: f32 = out.channel(0)[..1_000].iter().map(|s| s.abs()).sum();
        let late: f32 = out.channel(0)[5_000..6_000].iter().map(|s| s.abs()).sum();
        assert!(early > late * 4.0, "early {} late {}", early, late);
        // Past the impulse length the tail is silent
        assert_eq!(out.channel(0)[4_100..].iter().filter(|s| **s != 0.0).count(), 0);
    }

    #[test]
    fn test_zero_return_gain_is_silent() {
        let params = ReverbParams::default();
        let mut reverb = Reverb::new(&params, 8_000, &mut StdRng::seed_from_u64(5)).unwrap();
        let input = impulse_input(1_024);
        let mut out = AudioBuffer::new(1_024, ChannelLayout::Stereo, 8_000);
        reverb.process_into(&input, &mut out, 0.0);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = ReverbParams {
            taps_per_second: 0,
            ..ReverbParams::default()
        };
        assert!(Reverb::new(&params, 8_000, &mut StdRng::seed_from_u64(1)).is_err());
    }
}
