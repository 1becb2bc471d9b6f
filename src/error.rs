//! Error types for the audio pipeline, word storage and word entry

use crate::ai::AiError;
use thiserror::Error;

/// Errors raised by capture, transport encoding, decoding and playback.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No microphone, permission denied, or the audio server refused the stream.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The microphone is already held by another capture session.
    #[error("Microphone is already in use by another recording")]
    DeviceBusy,

    /// The encoded recording could not be read for transport.
    #[error("Could not read recorded audio: {0}")]
    CodecReadError(String),

    /// Raw PCM whose length is not a whole number of frames.
    #[error("Malformed PCM data: {len} bytes is not a multiple of {frame_bytes}-byte frames")]
    MalformedAudioData { len: usize, frame_bytes: usize },

    /// Sample rate or channel count out of range.
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    /// Text that is not valid base64.
    #[error("Invalid base64 audio payload: {0}")]
    InvalidTransportText(#[from] base64::DecodeError),

    /// Writing the recording container failed.
    #[error("Failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}

/// Errors raised while persisting the word list.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access word store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize words: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a new word was not added
#[derive(Debug, Error)]
pub enum AddWordError {
    #[error("Please type a word to add")]
    EmptyWord,

    #[error("Failed to generate details for \"{word}\"")]
    Details {
        word: String,
        #[source]
        source: AiError,
    },
}
