//! Microphone capture
//!
//! `Recorder` owns at most one capture session. Sessions hold the exclusive
//! microphone lease and collect PCM chunks from the device until stopped,
//! then finalize them into a WAV recording. The PipeWire backend runs its
//! main loop on a dedicated thread and feeds chunks back over a channel.

use super::container::{EncodedAudio, WavContainer};
use super::device::{
    CaptureConfig, ChunkSender, DeviceLease, InputDevice, InputHandle, MicrophoneLock,
};
use super::pcm::quantize;
use crate::error::AudioError;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// How long a new stream may take to link to a source and start streaming
const OPEN_TIMEOUT: Duration = Duration::from_secs(3);

/// An active recording
///
/// Dropping a session without stopping it still releases the device.
pub struct CaptureSession {
    handle: Option<Box<dyn InputHandle>>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    lease: Option<DeviceLease>,
    config: CaptureConfig,
}

/// Acquire the microphone and start recording
pub async fn start_capture(
    device: &dyn InputDevice,
    lock: &MicrophoneLock,
    config: &CaptureConfig,
) -> Result<CaptureSession, AudioError> {
    let lease = lock.acquire()?;
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle = device.open(config, sender).await?;
    info!(
        "Capture started at {} Hz, {} channel(s)",
        config.sample_rate, config.channels
    );

    Ok(CaptureSession {
        handle: Some(handle),
        chunks: receiver,
        lease: Some(lease),
        config: config.clone(),
    })
}

impl CaptureSession {
    /// Stop recording and wait for the device to deliver its last chunk
    pub async fn stop(mut self) -> Result<EncodedAudio, AudioError> {
        let mut format = self.config.clone();
        if let Some(handle) = self.handle.take() {
            if let Some(negotiated) = handle.format() {
                format = negotiated;
            }
            handle.close();
        }

        let mut collected = Vec::new();
        while let Some(chunk) = self.chunks.recv().await {
            if !chunk.is_empty() {
                collected.push(chunk);
            }
        }

        if let Some(lease) = self.lease.take() {
            lease.release();
        }

        let container = WavContainer::new(format.sample_rate, format.channels);
        let audio = container.finalize(&collected)?;
        info!(
            "Capture stopped: {} chunk(s), {} bytes",
            collected.len(),
            audio.len()
        );
        Ok(audio)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Capture session dropped while active, releasing device");
            handle.close();
        }
    }
}

/// Owns the microphone device and at most one capture session
pub struct Recorder {
    device: Arc<dyn InputDevice>,
    lock: MicrophoneLock,
    config: CaptureConfig,
    session: Option<CaptureSession>,
}

impl Recorder {
    /// Recorder over the default PipeWire input
    pub fn new() -> Self {
        Self::with_device(Arc::new(PipeWireInput), MicrophoneLock::global())
    }

    pub fn with_device(device: Arc<dyn InputDevice>, lock: MicrophoneLock) -> Self {
        Self {
            device,
            lock,
            config: CaptureConfig::default(),
            session: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Start capturing audio
    pub async fn start(&mut self) -> Result<(), AudioError> {
        if self.is_recording() {
            return Err(AudioError::DeviceBusy);
        }
        let session = start_capture(self.device.as_ref(), &self.lock, &self.config).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Stop capturing and return the recording; `None` if nothing was recording
    pub async fn stop(&mut self) -> Result<Option<EncodedAudio>, AudioError> {
        match self.session.take() {
            Some(session) => session.stop().await.map(Some),
            None => Ok(None),
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default PipeWire audio source
pub struct PipeWireInput;

enum PipeWireCommand {
    Stop,
}

/// Format negotiated by the stream, written from the PipeWire thread
type NegotiatedFormat = Arc<Mutex<Option<CaptureConfig>>>;

/// One-shot readiness report shared by setup code and stream callbacks
type Readiness = Arc<Mutex<Option<oneshot::Sender<Result<(), AudioError>>>>>;

/// Deliver the first readiness result; later reports are ignored
fn report_ready(ready: &Readiness, result: Result<(), AudioError>) {
    if let Some(sender) = ready.lock().unwrap_or_else(|e| e.into_inner()).take() {
        let _ = sender.send(result);
    }
}

/// Wait for the backend to report the stream live
async fn await_ready(
    ready: oneshot::Receiver<Result<(), AudioError>>,
    limit: Duration,
) -> Result<(), AudioError> {
    match tokio::time::timeout(limit, ready).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(AudioError::DeviceUnavailable(
            "capture thread exited before the stream started".to_string(),
        )),
        Err(_) => Err(AudioError::DeviceUnavailable(format!(
            "no input device started streaming within {:.1}s",
            limit.as_secs_f64()
        ))),
    }
}

struct PipeWireCapture {
    sender: Option<pw::channel::Sender<PipeWireCommand>>,
    thread_handle: Option<JoinHandle<()>>,
    negotiated: NegotiatedFormat,
}

impl PipeWireCapture {
    fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PipeWireCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl InputHandle for PipeWireCapture {
    fn format(&self) -> Option<CaptureConfig> {
        self.negotiated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn close(mut self: Box<Self>) {
        self.shutdown();
    }
}

#[async_trait]
impl InputDevice for PipeWireInput {
    async fn open(
        &self,
        config: &CaptureConfig,
        chunks: ChunkSender,
    ) -> Result<Box<dyn InputHandle>, AudioError> {
        let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let ready: Readiness = Arc::new(Mutex::new(Some(ready_tx)));
        let negotiated = NegotiatedFormat::default();
        let config = config.clone();

        let thread_negotiated = negotiated.clone();
        let thread = thread::Builder::new()
            .name("wordcoach-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_capture_loop(config, chunks, receiver, ready, thread_negotiated)
                {
                    error!("Capture error: {}", e);
                }
            })
            .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to spawn capture: {}", e)))?;

        let mut capture = PipeWireCapture {
            sender: Some(sender),
            thread_handle: Some(thread),
            negotiated,
        };

        match await_ready(ready_rx, OPEN_TIMEOUT).await {
            Ok(()) => Ok(Box::new(capture)),
            Err(e) => {
                capture.shutdown();
                Err(e)
            }
        }
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    config: CaptureConfig,
    chunks: ChunkSender,
    receiver: pw::channel::Receiver<PipeWireCommand>,
    ready: Readiness,
    negotiated: NegotiatedFormat,
) -> Result<(), String> {
    let fail = |message: String| -> String {
        report_ready(&ready, Err(AudioError::DeviceUnavailable(message.clone())));
        message
    };

    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| fail(format!("Failed to create PipeWire main loop: {}", e)))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| fail(format!("Failed to create PipeWire context: {}", e)))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| fail(format!("Failed to connect to PipeWire: {}", e)))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    // User data for the stream callbacks; dropping it closes the chunk channel
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        requested: CaptureConfig,
        negotiated: NegotiatedFormat,
        ready: Readiness,
        chunks: ChunkSender,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        requested: config.clone(),
        negotiated,
        ready: ready.clone(),
        chunks,
        mainloop_weak: mainloop.downgrade(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Wordcoach",
    };

    let stream = pw::stream::StreamBox::new(&core, "wordcoach-capture", props)
        .map_err(|e| fail(format!("Failed to create PipeWire stream: {}", e)))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, _old, new| match new {
            // Only a linked source gets the stream to Streaming
            pw::stream::StreamState::Streaming => report_ready(&user_data.ready, Ok(())),
            pw::stream::StreamState::Error(message) => {
                warn!("Capture stream error: {}", message);
                report_ready(
                    &user_data.ready,
                    Err(AudioError::DeviceUnavailable(message.to_string())),
                );
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
            }
            _ => {}
        })
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
                warn!("Failed to parse capture format: {:?}", e);
                return;
            }

            let format = CaptureConfig {
                sample_rate: user_data.format.rate(),
                channels: user_data.format.channels() as u16,
            };
            debug!(
                "Capture format negotiated: {} Hz, {} channel(s)",
                format.sample_rate, format.channels
            );
            if format != user_data.requested {
                warn!(
                    "Capture negotiated {} Hz/{}ch instead of {} Hz/{}ch",
                    format.sample_rate,
                    format.channels,
                    user_data.requested.sample_rate,
                    user_data.requested.channels
                );
            }
            *user_data.negotiated.lock().unwrap_or_else(|e| e.into_inner()) = Some(format);
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
            let size = data.chunk().size() as usize;
            let Some(raw) = data.data() else {
                return;
            };

            // F32LE in, S16LE out, channel layout unchanged
            let raw = &raw[..size.min(raw.len())];
            let mut chunk = Vec::with_capacity(raw.len() / 2);
            for sample in raw.chunks_exact(std::mem::size_of::<f32>()) {
                let value = f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
                chunk.extend_from_slice(&quantize(value).to_le_bytes());
            }

            if !chunk.is_empty() {
                let _ = user_data.chunks.send(chunk);
            }
        })
        .register()
        .map_err(|e| fail(format!("Failed to register stream listener: {}", e)))?;

    // Request F32LE at the configured rate and channel count
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(config.sample_rate);
    audio_info.set_channels(config.channels as u32);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| fail(format!("Failed to serialize audio format: {:?}", e)))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| fail("Failed to build audio format pod".to_string()))?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| fail(format!("Failed to connect stream: {}", e)))?;

    // Readiness is reported from state_changed once a source is linked.
    // Run until stopped
    mainloop.run();
    debug!("Capture loop finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Microphone that replays scripted chunks
    #[derive(Default)]
    struct ScriptedMic {
        chunks: Vec<Vec<u8>>,
        /// Sent from a task spawned by `close`, after a short delay
        final_chunk: Option<Vec<u8>>,
        negotiated: Option<CaptureConfig>,
        missing: bool,
        open_count: Mutex<usize>,
        /// Whether the lease was still held each time a handle closed
        held_at_close: Arc<Mutex<Vec<bool>>>,
        lock: Option<MicrophoneLock>,
    }

    impl ScriptedMic {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks,
                ..Default::default()
            }
        }

        fn missing() -> Self {
            Self {
                missing: true,
                ..Default::default()
            }
        }
    }

    struct ScriptedHandle {
        chunks: Option<ChunkSender>,
        final_chunk: Option<Vec<u8>>,
        negotiated: Option<CaptureConfig>,
        held_at_close: Arc<Mutex<Vec<bool>>>,
        lock: Option<MicrophoneLock>,
    }

    impl InputHandle for ScriptedHandle {
        fn format(&self) -> Option<CaptureConfig> {
            self.negotiated.clone()
        }

        fn close(mut self: Box<Self>) {
            if let Some(lock) = &self.lock {
                self.held_at_close.lock().unwrap().push(lock.is_held());
            }
            let Some(chunks) = self.chunks.take() else {
                return;
            };
            if let Some(last) = self.final_chunk.take() {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    chunks.send(last).unwrap();
                });
            }
        }
    }

    #[async_trait]
    impl InputDevice for ScriptedMic {
        async fn open(
            &self,
            _config: &CaptureConfig,
            chunks: ChunkSender,
        ) -> Result<Box<dyn InputHandle>, AudioError> {
            if self.missing {
                return Err(AudioError::DeviceUnavailable("no input device".to_string()));
            }
            *self.open_count.lock().unwrap() += 1;
            for chunk in &self.chunks {
                chunks.send(chunk.clone()).unwrap();
            }
            Ok(Box::new(ScriptedHandle {
                chunks: Some(chunks),
                final_chunk: self.final_chunk.clone(),
                negotiated: self.negotiated.clone(),
                held_at_close: self.held_at_close.clone(),
                lock: self.lock.clone(),
            }))
        }
    }

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn read_wav(audio: &EncodedAudio) -> (hound::WavSpec, Vec<i16>) {
        let reader = hound::WavReader::new(std::io::Cursor::new(audio.bytes().to_vec())).unwrap();
        let spec = reader.spec();
        let samples = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[tokio::test]
    async fn test_chunks_kept_in_order() {
        let mic = Arc::new(ScriptedMic::new(vec![
            pcm(&[10, 20]),
            Vec::new(),
            pcm(&[30]),
            pcm(&[-40, 50, 60]),
        ]));
        let mut recorder = Recorder::with_device(mic, MicrophoneLock::new());

        recorder.start().await.unwrap();
        assert!(recorder.is_recording());
        let audio = recorder.stop().await.unwrap().unwrap();
        assert!(!recorder.is_recording());

        assert_eq!(audio.mime_type(), "audio/wav");
        let (spec, samples) = read_wav(&audio);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert_eq!(samples, vec![10, 20, 30, -40, 50, 60]);
    }

    #[tokio::test]
    async fn test_final_chunk_after_close_is_kept() {
        let lock = MicrophoneLock::new();
        let mic = ScriptedMic {
            chunks: vec![pcm(&[1, 2])],
            final_chunk: Some(pcm(&[7, 8])),
            ..Default::default()
        };
        let session = start_capture(&mic, &lock, &CaptureConfig::default())
            .await
            .unwrap();

        let audio = session.stop().await.unwrap();
        assert_eq!(read_wav(&audio).1, vec![1, 2, 7, 8]);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn test_wav_uses_negotiated_format() {
        let lock = MicrophoneLock::new();
        let mic = ScriptedMic {
            chunks: vec![pcm(&[1, -1, 2, -2])],
            negotiated: Some(CaptureConfig {
                sample_rate: 48000,
                channels: 2,
            }),
            ..Default::default()
        };
        let session = start_capture(&mic, &lock, &CaptureConfig::default())
            .await
            .unwrap();

        let (spec, samples) = read_wav(&session.stop().await.unwrap());
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.channels, 2);
        assert_eq!(samples, vec![1, -1, 2, -2]);
    }

    #[tokio::test]
    async fn test_zero_chunks_is_empty_recording() {
        let lock = MicrophoneLock::new();
        let mic = ScriptedMic::new(Vec::new());
        let session = start_capture(&mic, &lock, &CaptureConfig::default())
            .await
            .unwrap();
        let audio = session.stop().await.unwrap();
        assert!(audio.is_empty());
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let mut recorder =
            Recorder::with_device(Arc::new(ScriptedMic::new(Vec::new())), MicrophoneLock::new());
        assert!(recorder.stop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_session_is_busy() {
        let lock = MicrophoneLock::new();
        let mic: Arc<dyn InputDevice> = Arc::new(ScriptedMic::new(vec![pcm(&[1])]));
        let mut first = Recorder::with_device(mic.clone(), lock.clone());
        let mut second = Recorder::with_device(mic, lock.clone());

        first.start().await.unwrap();
        assert!(matches!(second.start().await, Err(AudioError::DeviceBusy)));
        assert!(matches!(first.start().await, Err(AudioError::DeviceBusy)));

        first.stop().await.unwrap();
        second.start().await.unwrap();
        assert!(second.stop().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let lock = MicrophoneLock::new();
        let mic = Arc::new(ScriptedMic::new(vec![pcm(&[1, 2])]));
        {
            let mut recorder = Recorder::with_device(mic.clone(), lock.clone());
            recorder.start().await.unwrap();
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
        assert!(lock.acquire().is_ok());
        assert_eq!(*mic.open_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_device_closed_before_lease_released() {
        let lock = MicrophoneLock::new();
        let mic = ScriptedMic {
            lock: Some(lock.clone()),
            ..ScriptedMic::new(vec![pcm(&[1])])
        };

        let session = start_capture(&mic, &lock, &CaptureConfig::default())
            .await
            .unwrap();
        session.stop().await.unwrap();

        let session = start_capture(&mic, &lock, &CaptureConfig::default())
            .await
            .unwrap();
        drop(session);

        assert_eq!(*mic.held_at_close.lock().unwrap(), vec![true, true]);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn test_unavailable_device() {
        let lock = MicrophoneLock::new();
        let mut recorder = Recorder::with_device(Arc::new(ScriptedMic::missing()), lock.clone());
        assert!(matches!(
            recorder.start().await,
            Err(AudioError::DeviceUnavailable(_))
        ));
        assert!(!recorder.is_recording());
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn test_stream_that_never_starts_is_unavailable() {
        let (sender, receiver) = oneshot::channel();
        let ready: Readiness = Arc::new(Mutex::new(Some(sender)));

        let result = await_ready(receiver, Duration::from_millis(30)).await;
        assert!(matches!(result, Err(AudioError::DeviceUnavailable(_))));
        // Still pending: nothing was ever reported
        assert!(ready.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_capture_thread_exit_is_unavailable() {
        let (sender, receiver) = oneshot::channel::<Result<(), AudioError>>();
        drop(sender);
        assert!(matches!(
            await_ready(receiver, Duration::from_secs(5)).await,
            Err(AudioError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_first_readiness_report_wins() {
        let (sender, receiver) = oneshot::channel();
        let ready: Readiness = Arc::new(Mutex::new(Some(sender)));

        report_ready(
            &ready,
            Err(AudioError::DeviceUnavailable("stream error".to_string())),
        );
        report_ready(&ready, Ok(()));

        match await_ready(receiver, Duration::from_secs(5)).await {
            Err(AudioError::DeviceUnavailable(message)) => assert_eq!(message, "stream error"),
            other => panic!("unexpected readiness: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streaming_report_opens() {
        let (sender, receiver) = oneshot::channel();
        let ready: Readiness = Arc::new(Mutex::new(Some(sender)));
        report_ready(&ready, Ok(()));
        assert!(await_ready(receiver, Duration::from_secs(5)).await.is_ok());
    }
}
