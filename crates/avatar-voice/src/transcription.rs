//! Speech-to-text: one-shot recognition sessions and the transcription backends behind them.
//!
//! A session is started with [`TranscriptionAdapter::begin_session`] and delivers at most one
//! transcript through [`TranscriptSession::transcript`]. Ending the session early guarantees
//! the transcript is never delivered. Recognition failures are logged and end the session
//! without a transcript.

use crate::error::{VoiceError, VoiceResult};
use crate::utterance::Utterance;
use async_trait::async_trait;
use avatar_core::TranscriptionConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Single-shot recognizer: listens for one utterance and returns its text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// `Ok(None)` when nothing intelligible was heard.
    async fn recognize_utterance(&self) -> VoiceResult<Option<String>>;
}

/// Converts captured PCM into text.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Returns an empty string when no speech was recognized.
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String>;
}

/// Encode mono f32 PCM as a 16-bit WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let pcm = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }
    buf
}

/// OpenAI-compatible transcription API (`POST {base_url}/audio/transcriptions`).
#[derive(Debug, Clone)]
pub struct RemoteTranscriber {
    base_url: String,
    api_key: String,
    model: String,
    /// ISO-639-1 hint, e.g. `en`.
    language: Option<String>,
    client: reqwest::Client,
}

impl RemoteTranscriber {
    pub fn from_config(config: &TranscriptionConfig, language: Option<&str>) -> VoiceResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                VoiceError::Config(
                    "transcription requires STT_API_KEY or OPENAI_API_KEY".to_string(),
                )
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            language: language.map(str::to_string),
            client,
        })
    }
}

#[async_trait]
impl TranscriptionBackend for RemoteTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
        if utterance.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = encode_wav(&utterance.samples, utterance.sample_rate);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        debug!(%url, seconds = utterance.duration().as_secs_f32(), "uploading utterance");
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }

        let json: serde_json::Value = res.json().await.map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

struct ActiveSession {
    id: u64,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Runs recognition sessions, at most one at a time.
pub struct TranscriptionAdapter {
    recognizer: Arc<dyn SpeechRecognizer>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    next_id: AtomicU64,
}

impl TranscriptionAdapter {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start one recognition session in the background.
    ///
    /// Fails with [`VoiceError::SessionActive`] while a previous session is still running.
    pub fn begin_session(&self) -> VoiceResult<TranscriptSession> {
        let mut slot = self.active.lock();
        if slot.as_ref().is_some_and(|s| !s.task.is_finished()) {
            return Err(VoiceError::SessionActive);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let recognizer = Arc::clone(&self.recognizer);
        let flag = Arc::clone(&cancelled);
        let active = Arc::clone(&self.active);
        let task = tokio::spawn(async move {
            let transcript = match recognizer.recognize_utterance().await {
                Ok(Some(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
                Ok(_) => {
                    debug!(session = id, "no speech recognized");
                    None
                }
                Err(e) => {
                    warn!(session = id, error = %e, "speech recognition failed");
                    None
                }
            };
            if let Some(text) = transcript {
                if !flag.load(Ordering::SeqCst) {
                    let _ = tx.send(text);
                }
            }
            let mut slot = active.lock();
            if slot.as_ref().is_some_and(|s| s.id == id) {
                *slot = None;
            }
        });

        *slot = Some(ActiveSession {
            id,
            cancelled: Arc::clone(&cancelled),
            task,
        });
        info!(session = id, "👂 recognition session started");
        Ok(TranscriptSession { id, rx, cancelled })
    }

    /// Cancel the active session. Returns false when no session was running.
    pub fn end_session(&self) -> bool {
        let Some(session) = self.active.lock().take() else {
            return false;
        };
        if session.task.is_finished() {
            return false;
        }
        session.cancelled.store(true, Ordering::SeqCst);
        session.task.abort();
        info!(session = session.id, "recognition session ended");
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }
}

/// Handle to one recognition session.
pub struct TranscriptSession {
    id: u64,
    rx: oneshot::Receiver<String>,
    cancelled: Arc<AtomicBool>,
}

impl TranscriptSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the transcript. `None` when the session was cancelled, heard nothing, or failed.
    pub async fn transcript(self) -> Option<String> {
        let text = self.rx.await.ok()?;
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        Some(text)
    }
}
