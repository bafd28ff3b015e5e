//! Microphone speech recognizer: capture, VAD and endpointing on a dedicated thread,
//! then transcription of the committed utterance.

use crate::audio::{AudioCapture, AudioConfig};
use crate::error::{VoiceError, VoiceResult};
use crate::transcription::{SpeechRecognizer, TranscriptionBackend};
use crate::utterance::{Utterance, UtteranceConfig, UtteranceDetector};
use crate::vad::{VadConfig, VoiceActivityDetector};
use async_trait::async_trait;
use avatar_core::TranscriptionConfig;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// How often the capture thread checks whether the session was cancelled.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Listens on the default input device for one utterance per call.
pub struct MicrophoneRecognizer {
    vad: VadConfig,
    utterance: UtteranceConfig,
    backend: Arc<dyn TranscriptionBackend>,
}

impl MicrophoneRecognizer {
    pub fn new(config: &TranscriptionConfig, backend: Arc<dyn TranscriptionBackend>) -> Self {
        Self {
            vad: VadConfig {
                sample_rate: config.sample_rate,
                mode: config.vad_mode,
            },
            utterance: UtteranceConfig::from(config),
            backend,
        }
    }

    /// Capture until the first utterance is committed. Dropping the returned future stops
    /// the capture thread within one poll interval.
    pub async fn capture_utterance(&self) -> VoiceResult<Option<Utterance>> {
        let (tx, rx) = oneshot::channel();
        let vad = self.vad.clone();
        let utterance = self.utterance.clone();

        thread::Builder::new()
            .name("avatar-mic".to_string())
            .spawn(move || {
                let result = capture_blocking(vad, utterance, &tx);
                let _ = tx.send(result);
            })?;

        rx.await
            .map_err(|e| VoiceError::Channel(format!("capture thread exited: {}", e)))?
    }
}

#[async_trait]
impl SpeechRecognizer for MicrophoneRecognizer {
    async fn recognize_utterance(&self) -> VoiceResult<Option<String>> {
        let Some(utterance) = self.capture_utterance().await? else {
            return Ok(None);
        };
        info!(
            seconds = utterance.duration().as_secs_f32(),
            "🗣️ utterance captured, transcribing"
        );
        let text = self.backend.transcribe(&utterance).await?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

fn capture_blocking(
    vad_config: VadConfig,
    utterance_config: UtteranceConfig,
    session: &oneshot::Sender<VoiceResult<Option<Utterance>>>,
) -> VoiceResult<Option<Utterance>> {
    let mut vad = VoiceActivityDetector::new(vad_config)?;
    let mut detector = UtteranceDetector::new(utterance_config);

    let capture = AudioCapture::new(AudioConfig {
        sample_rate: vad.sample_rate(),
        channels: 1,
        chunk_size: vad.frame_size(),
    })?;
    let (chunk_tx, chunk_rx) = mpsc::channel();
    let _stream = capture.start(chunk_tx)?;
    debug!("microphone open");

    loop {
        if session.is_closed() {
            debug!(
                mid_utterance = detector.in_speech(),
                "listening cancelled, closing microphone"
            );
            return Ok(None);
        }
        match chunk_rx.recv_timeout(CANCEL_POLL) {
            Ok(chunk) => {
                let speech = vad.is_speech(&chunk.samples)?;
                if let Some(utterance) = detector.push_frame(&chunk.samples, speech) {
                    return Ok(Some(utterance));
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(detector.flush()),
        }
    }
}
