//! Audio playback using PipeWire
//!
//! Every `play` call starts an independent voice, so overlapping calls
//! overlap audibly. Voices stop on their own once their buffer runs out.

use super::device::{OutputDevice, Voice};
use super::pcm::DecodedBuffer;
use crate::error::AudioError;
use log::{debug, error, info, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Read position over an interleaved buffer
pub struct VoiceCursor {
    samples: Vec<f32>,
    channels: usize,
    position: usize,
}

impl VoiceCursor {
    pub fn new(buffer: &DecodedBuffer) -> Self {
        Self {
            samples: buffer.interleaved(),
            channels: buffer.channel_count().max(1),
            position: 0,
        }
    }

    /// Take up to `frames` interleaved frames; `None` once exhausted
    pub fn next_frames(&mut self, frames: usize) -> Option<&[f32]> {
        if self.position >= self.samples.len() {
            return None;
        }
        let start = self.position;
        let end = (start + frames * self.channels).min(self.samples.len());
        self.position = end;
        Some(&self.samples[start..end])
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.samples.len()
    }
}

/// Shared output context
pub struct AudioOutput {
    device: Box<dyn OutputDevice>,
    voices: Mutex<Vec<Box<dyn Voice>>>,
}

impl AudioOutput {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            voices: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide output context, created on first use
    pub fn shared() -> &'static AudioOutput {
        static OUTPUT: OnceLock<AudioOutput> = OnceLock::new();
        OUTPUT.get_or_init(|| AudioOutput::new(Box::new(PipeWireOutput)))
    }

    /// Start playing a buffer right away on a fresh voice
    pub fn play(&self, buffer: DecodedBuffer) -> Result<(), AudioError> {
        debug!(
            "Playing {} frame(s) at {} Hz",
            buffer.frame_count(),
            buffer.sample_rate()
        );
        let voice = self.device.start_voice(buffer)?;

        let mut voices = self.voices.lock().unwrap_or_else(|e| e.into_inner());
        let (finished, active): (Vec<_>, Vec<_>) =
            voices.drain(..).partition(|v| v.is_finished());
        *voices = active;
        voices.push(voice);
        drop(voices);

        for voice in finished {
            voice.stop();
        }
        Ok(())
    }

    /// Number of voices still sounding
    pub fn active_voices(&self) -> usize {
        self.voices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|v| !v.is_finished())
            .count()
    }

    /// Wait until every voice has finished, giving up after `limit`
    ///
    /// Returns `false` if voices were still sounding when time ran out.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let idle = async {
            while self.active_voices() > 0 {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(limit, idle).await.is_ok()
    }

    /// Stop all voices and release the output device
    pub fn shutdown(&self) {
        let voices: Vec<_> = self
            .voices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        if !voices.is_empty() {
            info!("Stopping {} playback voice(s)", voices.len());
        }
        for voice in voices {
            voice.stop();
        }
    }
}

/// Default PipeWire audio sink
pub struct PipeWireOutput;

enum PlaybackCommand {
    Stop,
}

struct PipeWireVoice {
    finished: Arc<AtomicBool>,
    sender: Option<pw::channel::Sender<PlaybackCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Voice for PipeWireVoice {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn stop(mut self: Box<Self>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PlaybackCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl OutputDevice for PipeWireOutput {
    fn start_voice(&self, buffer: DecodedBuffer) -> Result<Box<dyn Voice>, AudioError> {
        let finished = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = pw::channel::channel::<PlaybackCommand>();

        let done = finished.clone();
        let handle = thread::Builder::new()
            .name("wordcoach-playback".to_string())
            .spawn(move || {
                if let Err(e) = run_playback_loop(buffer, receiver) {
                    error!("Playback error: {}", e);
                }
                done.store(true, Ordering::SeqCst);
            })
            .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to spawn playback: {}", e)))?;

        Ok(Box::new(PipeWireVoice {
            finished,
            sender: Some(sender),
            thread_handle: Some(handle),
        }))
    }
}

/// Run the PipeWire playback loop in a background thread
fn run_playback_loop(
    buffer: DecodedBuffer,
    receiver: pw::channel::Receiver<PlaybackCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PlaybackCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        cursor: VoiceCursor,
        channels: usize,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let sample_rate = buffer.sample_rate();
    let channels = buffer.channel_count().max(1);
    let user_data = UserData {
        format: Default::default(),
        cursor: VoiceCursor::new(&buffer),
        channels,
        mainloop_weak: mainloop.downgrade(),
    };
    drop(buffer);

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Wordcoach",
    };

    let stream = pw::stream::StreamBox::new(&core, "wordcoach-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if let Err(e) = user_data.format.parse(param) {
                warn!("Failed to parse playback format: {:?}", e);
                return;
            }
            debug!(
                "Playback format negotiated: {} Hz, {} channel(s)",
                user_data.format.rate(),
                user_data.format.channels()
            );
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.channels;
            let stride = std::mem::size_of::<f32>() * n_channels;

            let Some(slice) = data.data() else {
                return;
            };

            let n_frames = slice.len() / stride;

            let written = match user_data.cursor.next_frames(n_frames) {
                Some(samples) => {
                    for (i, &sample) in samples.iter().enumerate() {
                        let offset = i * std::mem::size_of::<f32>();
                        slice[offset..offset + 4].copy_from_slice(&sample.to_le_bytes());
                    }
                    samples.len() * std::mem::size_of::<f32>()
                }
                None => {
                    // Buffer drained, stop the voice
                    if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                        mainloop.quit();
                    }
                    return;
                }
            };

            // Fill remainder of a short final period with silence
            let period = n_frames * stride;
            slice[written..period].fill(0);

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = period as u32;
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Request F32LE at the buffer's own rate and channel count
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(sample_rate);
    audio_info.set_channels(channels as u32);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values).ok_or("Failed to build audio format pod")?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Run until stopped or playback ends
    mainloop.run();

    Ok(())
}
