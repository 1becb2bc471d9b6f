//! WAV container for captured audio using hound
//!
//! Captured chunks are 16-bit little-endian PCM. Finalizing wraps them in a
//! RIFF/WAVE container so the grading service can identify the format.

use crate::error::AudioError;
use hound::{WavSpec, WavWriter};
use std::io::Cursor;
use std::path::PathBuf;

pub const WAV_MIME: &str = "audio/wav";

/// A finished recording tagged with its container type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedAudio {
    mime_type: String,
    bytes: Vec<u8>,
}

impl EncodedAudio {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Builds WAV recordings from PCM chunks
pub struct WavContainer {
    spec: WavSpec,
    recordings_dir: PathBuf,
}

impl WavContainer {
    /// Create a container writer for 16-bit PCM at the given format
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let recordings_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wordcoach")
            .join("recordings");

        Self {
            spec,
            recordings_dir,
        }
    }

    #[cfg(test)]
    fn with_recordings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recordings_dir = dir.into();
        self
    }

    /// Concatenate chunks in order and wrap them in a WAV container
    ///
    /// No chunks (or only empty ones) yields a zero-length recording.
    pub fn finalize(&self, chunks: &[Vec<u8>]) -> Result<EncodedAudio, AudioError> {
        let pcm = chunks.concat();
        if pcm.is_empty() {
            return Ok(EncodedAudio::new(WAV_MIME, Vec::new()));
        }

        let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
        let mut writer = WavWriter::new(&mut cursor, self.spec)?;
        for sample in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        writer.finalize()?;

        Ok(EncodedAudio::new(WAV_MIME, cursor.into_inner()))
    }

    /// Generate a unique filename for a kept attempt
    fn generate_filename(&self, word: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let uuid = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let slug: String = word
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        self.recordings_dir
            .join(format!("attempt_{}_{}_{}.wav", slug, timestamp, uuid))
    }

    /// Write a finished attempt of `word` into the recordings directory
    pub fn save(&self, audio: &EncodedAudio, word: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.recordings_dir)?;
        let path = self.generate_filename(word);
        std::fs::write(&path, audio.bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chunks_is_empty() {
        let container = WavContainer::new(16000, 1);
        let audio = container.finalize(&[]).unwrap();
        assert!(audio.is_empty());
        assert_eq!(audio.mime_type(), WAV_MIME);

        let audio = container.finalize(&[Vec::new(), Vec::new()]).unwrap();
        assert_eq!(audio.len(), 0);
    }

    #[test]
    fn test_chunks_concatenated_in_order() {
        let container = WavContainer::new(16000, 1);
        let chunks = vec![
            [1i16, 2].iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>(),
            [3i16].iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>(),
            [-4i16, 5].iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>(),
        ];
        let audio = container.finalize(&chunks).unwrap();
        assert_eq!(&audio.bytes()[..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(audio.bytes().to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, -4, 5]);
    }

    #[test]
    fn test_save_kept_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let recordings = dir.path().join("recordings");
        let container = WavContainer::new(16000, 1).with_recordings_dir(&recordings);
        let audio = container.finalize(&[vec![0, 0, 1, 0]]).unwrap();

        let path = container.save(&audio, "Ice cream").unwrap();
        assert!(path.starts_with(&recordings));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("attempt_ice-cream_"));
        assert_eq!(std::fs::read(&path).unwrap(), audio.bytes());
    }
}
