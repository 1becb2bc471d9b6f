//! Audio device seams and the exclusive microphone lock

use super::pcm::DecodedBuffer;
use crate::error::AudioError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

/// Audio capture configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Sample rate (default: 16000, plenty for speech grading)
    pub sample_rate: u32,
    /// Number of channels (default: 1 for mono)
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Sender side of the chunk stream a device feeds while recording
pub type ChunkSender = mpsc::UnboundedSender<Vec<u8>>;

/// An audio input that streams encoded chunks
///
/// The device must drop every clone of `chunks` once its final chunk has been
/// sent; the closed channel is the end-of-recording notification.
#[async_trait]
pub trait InputDevice: Send + Sync {
    /// Open the device and start streaming. Resolves once the device is live.
    async fn open(
        &self,
        config: &CaptureConfig,
        chunks: ChunkSender,
    ) -> Result<Box<dyn InputHandle>, AudioError>;
}

/// A live input stream
pub trait InputHandle: Send {
    /// The format the device actually delivers, once it has been negotiated
    fn format(&self) -> Option<CaptureConfig> {
        None
    }

    /// Release the device; returns once the stream is torn down
    fn close(self: Box<Self>);
}

/// An audio output that can start independent voices
pub trait OutputDevice: Send + Sync {
    /// Start playing a buffer immediately on a new voice
    fn start_voice(&self, buffer: DecodedBuffer) -> Result<Box<dyn Voice>, AudioError>;
}

/// A single-use playback node
pub trait Voice: Send {
    fn is_finished(&self) -> bool;

    /// Stop playback and wait for the voice to wind down
    fn stop(self: Box<Self>);
}

/// Guards the singleton microphone against double acquisition
#[derive(Clone, Debug, Default)]
pub struct MicrophoneLock {
    held: Arc<AtomicBool>,
}

impl MicrophoneLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock for the default input device
    pub fn global() -> Self {
        static GLOBAL: OnceLock<MicrophoneLock> = OnceLock::new();
        GLOBAL.get_or_init(MicrophoneLock::new).clone()
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Take the microphone, failing with `DeviceBusy` if someone else has it
    pub fn acquire(&self) -> Result<DeviceLease, AudioError> {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AudioError::DeviceBusy)?;
        Ok(DeviceLease {
            held: self.held.clone(),
        })
    }
}

/// Ownership of the microphone; released on drop
#[derive(Debug)]
pub struct DeviceLease {
    held: Arc<AtomicBool>,
}

impl DeviceLease {
    pub fn release(self) {}
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}
