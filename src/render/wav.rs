//! Uncompressed sample encoding
//!
//! Converts normalized float frames to interleaved little-endian 16-bit PCM
//! and wraps them in the 44-byte RIFF/WAVE container. Compressed formats are
//! someone else's job; this is the one container the engine owns.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{DriftwaveError, Result};

/// Convert a float buffer to interleaved 16-bit PCM samples
///
/// Samples are clamped to [-1, 1] and scaled asymmetrically — negative
/// values by 32768, positive by 32767 — so both rails are reachable without
/// overflow.
pub fn pcm16_from_buffer(buffer: &AudioBuffer) -> Vec<i16> {
    let channels = buffer.channels();
    let frames = buffer.len();
    let mut pcm = Vec::with_capacity(channels * frames);
    for frame in 0..frames {
        for ch in 0..channels {
            pcm.push(encode_sample(buffer.channel(ch)[frame]));
        }
    }
    pcm
}

#[inline]
fn encode_sample(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn wav_spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn encode_err<E: std::fmt::Display>(e: E) -> DriftwaveError {
    DriftwaveError::Encode {
        reason: e.to_string(),
    }
}

/// Wrap interleaved PCM in an in-memory RIFF/WAVE container
pub fn wav_bytes(pcm: &[i16], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, wav_spec(channels, sample_rate)).map_err(encode_err)?;
        for &sample in pcm {
            writer.write_sample(sample).map_err(encode_err)?;
        }
        writer.finalize().map_err(encode_err)?;
    }
    Ok(cursor.into_inner())
}

/// Write an encoded WAV straight to disk (CLI path)
pub fn write_wav_file(path: &Path, pcm: &[i16], channels: u16, sample_rate: u32) -> Result<()> {
    let mut writer =
        WavWriter::create(path, wav_spec(channels, sample_rate)).map_err(encode_err)?;
    for &sample in pcm {
        writer.write_sample(sample).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;

    #[test]
    fn test_scaling_is_asymmetric() {
        assert_eq!(encode_sample(1.0), 32767);
        assert_eq!(encode_sample(-1.0), -32768);
        assert_eq!(encode_sample(0.0), 0);
        // Clamped, not wrapped
        assert_eq!(encode_sample(2.0), 32767);
        assert_eq!(encode_sample(-2.0), -32768);
    }

    #[test]
    fn test_interleaving() {
        let mut buffer = AudioBuffer::new(2, ChannelLayout::Stereo, 44_100);
        buffer.channel_mut(0).copy_from_slice(&[0.5, -0.5]);
        buffer.channel_mut(1).copy_from_slice(&[-1.0, 1.0]);
        let pcm = pcm16_from_buffer(&buffer);
        assert_eq!(pcm, vec![16383, -32768, -16384, 32767]);
    }

    #[test]
    fn test_container_header() {
        let pcm = vec![0i16; 8];
        let bytes = wav_bytes(&pcm, 2, 44_100).unwrap();

        // 44-byte header followed by the sample data
        assert_eq!(bytes.len(), 44 + pcm.len() * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(&bytes[36..40], b"data");
        // PCM format tag, 2 channels, 44.1 kHz, 16-bit
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 2);
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            44_100
        );
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let pcm: Vec<i16> = (0..64).map(|i| (i * 100) as i16).collect();
        write_wav_file(&path, &pcm, 2, 8_000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(back, pcm);
    }
}
