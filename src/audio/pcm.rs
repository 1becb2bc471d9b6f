//! Raw 16-bit PCM decoding
//!
//! Synthesized speech arrives as headerless little-endian i16 samples,
//! channel-interleaved. The sample rate and channel count come from the
//! caller.

use crate::error::AudioError;

const BYTES_PER_SAMPLE: usize = 2;

/// What to do with a trailing partial frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePolicy {
    /// Drop the incomplete tail
    #[default]
    Truncate,
    /// Reject the buffer with `MalformedAudioData`
    Strict,
}

/// Per-channel float samples ready for playback
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Interleave the channels back into frame order
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }
}

/// Decode raw PCM into normalized per-channel samples
///
/// Each sample is `i16 / 32768.0`, so the output range is [-1.0, 1.0).
pub fn decode(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
    policy: FramePolicy,
) -> Result<DecodedBuffer, AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidFormat("sample rate must be positive".to_string()));
    }
    if channels == 0 {
        return Err(AudioError::InvalidFormat("at least one channel is required".to_string()));
    }

    let n_channels = channels as usize;
    let frame_bytes = BYTES_PER_SAMPLE * n_channels;
    if policy == FramePolicy::Strict && bytes.len() % frame_bytes != 0 {
        return Err(AudioError::MalformedAudioData {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut decoded = vec![Vec::with_capacity(frame_count); n_channels];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in decoded.iter_mut().zip(frame.chunks_exact(BYTES_PER_SAMPLE)) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channel.push(value as f32 / 32768.0);
        }
    }

    Ok(DecodedBuffer {
        sample_rate,
        channels: decoded,
    })
}

/// Quantize a float sample to i16 with the same scale `decode` uses
pub fn quantize(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
