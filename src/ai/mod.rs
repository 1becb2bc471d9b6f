//! AI collaborator: word details, speech synthesis and pronunciation grading
//!
//! The service is a black box reached over the Gemini REST API. Each call has
//! a typed result; anything that does not fit is `InvalidResponseShape`.

mod client;
mod error;
mod schema;

pub use client::GeminiClient;
pub use error::AiError;

use crate::models::{EvaluationResult, WordDetails};
use async_trait::async_trait;

/// Sample rate of synthesized speech unless the service says otherwise
pub const SPEECH_SAMPLE_RATE: u32 = 24000;
/// Synthesized speech is mono
pub const SPEECH_CHANNELS: u16 = 1;

/// Synthesized speech as delivered: base64 raw PCM plus its format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub data: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A recording ready for grading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptAudio {
    /// Base64 transport text of the recording
    pub data: String,
    pub mime_type: String,
}

/// The external generative service
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Phonetic, definition and example for a word
    async fn word_details(&self, text: &str) -> Result<WordDetails, AiError>;

    /// Speak a word aloud
    async fn synthesize_speech(&self, text: &str) -> Result<SpeechAudio, AiError>;

    /// Grade a recorded attempt at `target_word`
    async fn evaluate_pronunciation(
        &self,
        audio: &AttemptAudio,
        target_word: &str,
    ) -> Result<EvaluationResult, AiError>;
}
