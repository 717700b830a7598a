//! Audio buffer management
//!
//! Non-interleaved 32-bit float sample storage used throughout the engine.
//! Offline chunks, layer scratch blocks and pre-rendered loops are all
//! `AudioBuffer`s; only the final WAV encoding step leaves this format.

use crate::error::{DriftwaveError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `-inf` for zero or negative input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Core audio buffer type
///
/// Stores audio as non-interleaved 32-bit floating point samples; each
/// channel is a separate `Vec<f32>`.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given frame count and layout
    pub fn new(num_frames: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_frames]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Wrap existing channel data
    ///
    /// All channels must have the same length.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if let Some(first) = samples.first() {
            let len = first.len();
            if samples.iter().any(|ch| ch.len() != len) {
                return Err(DriftwaveError::Encode {
                    reason: "channel lengths differ".to_string(),
                });
            }
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of frames (samples per channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer duration in seconds
    pub fn duration_sec(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.samples[ch]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.samples[ch]
    }

    /// Mutable left/right views of a stereo buffer
    #[inline]
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (l, r) = self.samples.split_at_mut(1);
        (&mut l[0], &mut r[0])
    }

    /// Zero every sample
    pub fn clear(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Resize every channel, zero-filling new space
    pub fn resize(&mut self, num_frames: usize) {
        for channel in &mut self.samples {
            channel.clear();
            channel.resize(num_frames, 0.0);
        }
    }

    /// Add `other` into this buffer, scaled by `gain`
    ///
    /// Lengths are matched to the shorter of the two.
    pub fn mix_from(&mut self, other: &AudioBuffer, gain: f32) {
        for (dst_ch, src_ch) in self.samples.iter_mut().zip(&other.samples) {
            for (dst, src) in dst_ch.iter_mut().zip(src_ch) {
                *dst += src * gain;
            }
        }
    }

    /// Convert the buffer to interleaved order (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let channels = self.channels();
        let frames = self.len();
        let mut interleaved = Vec::with_capacity(channels * frames);
        for frame in 0..frames {
            for channel in &self.samples {
                interleaved.push(channel[frame]);
            }
        }
        interleaved
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|s| s.abs())
            .fold(0.0_f32, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_new_is_silent() {
        let buffer = AudioBuffer::new(128, ChannelLayout::Stereo, 44_100);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 128);
        assert_abs_diff_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_mix_from_scales() {
        let mut dst = AudioBuffer::new(4, ChannelLayout::Stereo, 8_000);
        let mut src = AudioBuffer::new(4, ChannelLayout::Stereo, 8_000);
        src.channel_mut(0).fill(0.5);
        src.channel_mut(1).fill(-0.5);

        dst.mix_from(&src, 0.5);
        dst.mix_from(&src, 0.5);

        assert_abs_diff_eq!(dst.channel(0)[2], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(dst.channel(1)[2], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_interleave_order() {
        let mut buffer = AudioBuffer::new(2, ChannelLayout::Stereo, 8_000);
        buffer.channel_mut(0).copy_from_slice(&[1.0, 3.0]);
        buffer.channel_mut(1).copy_from_slice(&[2.0, 4.0]);
        assert_eq!(buffer.to_interleaved(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_from_channels_rejects_ragged_data() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 8_000);
        assert!(result.is_err());
    }

    #[test]
    fn test_db_conversions() {
        assert_abs_diff_eq!(db_to_linear(0.0), 1.0);
        assert_abs_diff_eq!(db_to_linear(-6.0), 0.5012, epsilon = 1e-3);
        assert_abs_diff_eq!(linear_to_db(1.0), 0.0);
        assert!(linear_to_db(0.0).is_infinite());
    }
}
