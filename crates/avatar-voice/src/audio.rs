//! Audio I/O: microphone capture (CPAL), decoding and playback (Rodio).
//!
//! Capture and output devices are not `Send` on every platform, so both live on dedicated
//! threads. Capture hands out fixed-size chunks over a channel; output exposes a shared
//! `Sink` whose completion is awaited from async code.

use crate::error::{VoiceError, VoiceResult};
use crate::utterance::samples_to_duration;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

/// Capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Samples per emitted chunk (default: 480 = 30ms at 16kHz)
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_size: 480,
        }
    }
}

/// Fixed-size block of captured samples
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Samples normalized to -1.0..1.0
    pub samples: Vec<f32>,

    pub captured_at: Instant,
}

/// Microphone capture using the default CPAL input device
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    pub fn new(config: AudioConfig) -> VoiceResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        let default_config = device.default_input_config()?;
        debug!(?default_config, "default input config");

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Start the input stream. Chunks of exactly `chunk_size` samples are sent to `chunk_tx`
    /// until the returned `Stream` is dropped.
    pub fn start(self, chunk_tx: mpsc::Sender<AudioChunk>) -> VoiceResult<Stream> {
        let chunk_size = self.config.chunk_size;
        let mut pending = Vec::with_capacity(chunk_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push(sample);
                    if pending.len() == chunk_size {
                        let chunk = AudioChunk {
                            samples: std::mem::replace(&mut pending, Vec::with_capacity(chunk_size)),
                            captured_at: Instant::now(),
                        };
                        // Receiver gone means the session ended; the stream is about to drop.
                        let _ = chunk_tx.send(chunk);
                    }
                }
            },
            move |err| {
                warn!(error = %err, "audio input stream error");
            },
            None,
        )?;

        stream.play()?;
        debug!("audio capture started");
        Ok(stream)
    }

    /// Names of available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let devices = cpal::default_host().input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

/// Fully decoded PCM ready for playback with no further network or decode latency.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Decode encoded audio (MP3, WAV). Empty input or a stream with no samples yields `None`.
    pub fn decode(bytes: Vec<u8>) -> VoiceResult<Option<Self>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let decoder = rodio::Decoder::new(Cursor::new(bytes))?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
        if samples.is_empty() || channels == 0 || sample_rate == 0 {
            return Ok(None);
        }
        Ok(Some(Self::new(samples, channels, sample_rate)))
    }

    pub fn duration(&self) -> Duration {
        if self.channels == 0 {
            return Duration::ZERO;
        }
        samples_to_duration(self.samples.len() / usize::from(self.channels), self.sample_rate)
    }
}

/// Destination for decoded speech. `play` resolves once playback has finished.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, audio: DecodedAudio) -> VoiceResult<()>;

    /// Stop current playback immediately; a pending `play` resolves.
    fn stop(&self);

    fn is_playing(&self) -> bool;
}

/// Speaker output on the default device.
///
/// The Rodio `OutputStream` is owned by a dedicated thread and kept alive until this value
/// is dropped; the `Sink` is shared for appends and completion waits.
pub struct SpeakerOutput {
    sink: Arc<Sink>,
    _shutdown: oneshot::Sender<()>,
}

impl SpeakerOutput {
    pub fn new() -> VoiceResult<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<Arc<Sink>>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        thread::Builder::new()
            .name("avatar-audio-out".to_string())
            .spawn(move || {
                let opened = OutputStream::try_default()
                    .map_err(|e| VoiceError::Playback(e.to_string()))
                    .and_then(|(stream, handle)| {
                        Sink::try_new(&handle)
                            .map(|sink| (stream, Arc::new(sink)))
                            .map_err(|e| VoiceError::Playback(e.to_string()))
                    });
                match opened {
                    Ok((stream, sink)) => {
                        if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                            return;
                        }
                        // Sender dropped (or sent) when the SpeakerOutput goes away.
                        let _ = shutdown_rx.blocking_recv();
                        sink.stop();
                        drop(stream);
                        debug!("audio output thread exiting");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        let sink = ready_rx
            .recv()
            .map_err(|e| VoiceError::Channel(e.to_string()))??;
        info!("speaker output ready");
        Ok(Self {
            sink,
            _shutdown: shutdown_tx,
        })
    }
}

#[async_trait]
impl AudioOutput for SpeakerOutput {
    async fn play(&self, audio: DecodedAudio) -> VoiceResult<()> {
        let source = SamplesBuffer::new(audio.channels, audio.sample_rate, audio.samples);
        self.sink.append(source);
        self.sink.play();
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.sleep_until_end())
            .await
            .map_err(|e| VoiceError::Playback(e.to_string()))
    }

    fn stop(&self) {
        self.sink.stop();
        info!("speaker output stopped");
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }
}

/// Output without a device: waits out the audio duration. Used for text-only sessions and
/// headless hosts, keeping turn timing identical to real playback.
#[derive(Debug, Default)]
pub struct SilentOutput {
    playing: AtomicBool,
    interrupt: Notify,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioOutput for SilentOutput {
    async fn play(&self, audio: DecodedAudio) -> VoiceResult<()> {
        self.playing.store(true, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(audio.duration()) => {}
            _ = self.interrupt.notified() => {
                debug!("silent playback interrupted");
            }
        }
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.interrupt.notify_waiters();
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
