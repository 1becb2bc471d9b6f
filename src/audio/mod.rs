//! Audio capture, transport encoding, PCM decoding and playback
//!
//! This module provides:
//! - Microphone capture through PipeWire, finalized into WAV recordings
//! - Base64 transport text for recordings and synthesized speech
//! - Raw 16-bit PCM decoding into per-channel float buffers
//! - Fire-and-forget playback on a shared output context

mod capture;
pub mod codec;
mod container;
mod device;
pub mod pcm;
mod playback;

pub use capture::Recorder;
pub use container::{EncodedAudio, WavContainer};
pub use pcm::{DecodedBuffer, FramePolicy};
pub use playback::AudioOutput;
