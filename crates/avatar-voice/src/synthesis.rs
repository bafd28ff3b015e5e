//! Text-to-speech: backends that turn reply text into encoded audio, and the client that
//! prepares and plays it.
//!
//! Two ways to voice a reply:
//! - [`SpeechSynthesisClient::speak`]: network, decode and playback as one awaited unit.
//! - [`SpeechSynthesisClient::prepare`] then [`SpeechSynthesisClient::play`]: the audio is
//!   fully fetched and decoded first, so playback starts without further latency.

use crate::audio::{AudioOutput, DecodedAudio};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use avatar_core::SynthesisConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Turns text into encoded audio (MP3/WAV). An empty result means there is nothing to play.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Text-only mode: produces no audio.
#[derive(Debug, Default)]
pub struct SilentTts;

#[async_trait]
impl SynthesisBackend for SilentTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs text-to-speech (`POST {base_url}/text-to-speech/{voice_id}`).
#[derive(Debug, Clone)]
pub struct ElevenLabsTts {
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn from_config(config: &SynthesisConfig) -> VoiceResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| VoiceError::Config("TTS requires ELEVENLABS_API_KEY".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
            client,
        })
    }
}

#[async_trait]
impl SynthesisBackend for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/text-to-speech/{}", self.base_url, self.voice_id);
        let body = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };
        debug!(%url, chars = text.len(), "requesting speech");

        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Prepared speech, fully decoded. Consumed by [`SpeechSynthesisClient::play`]; dropping it
/// releases the audio.
#[derive(Debug)]
pub struct PlaybackHandle {
    audio: Option<DecodedAudio>,
}

impl PlaybackHandle {
    pub fn empty() -> Self {
        Self { audio: None }
    }

    /// True when there is nothing to play.
    pub fn is_empty(&self) -> bool {
        self.audio.is_none()
    }

    pub fn duration(&self) -> Duration {
        self.audio
            .as_ref()
            .map(DecodedAudio::duration)
            .unwrap_or_default()
    }
}

/// Synthesis backend plus a single audio output. Playback is serialized: a new `play`
/// waits until the previous one has finished.
pub struct SpeechSynthesisClient {
    backend: Arc<dyn SynthesisBackend>,
    output: Arc<dyn AudioOutput>,
    playback: Mutex<()>,
}

impl SpeechSynthesisClient {
    pub fn new(backend: Arc<dyn SynthesisBackend>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            backend,
            output,
            playback: Mutex::new(()),
        }
    }

    /// Fetch and decode speech for `text` without playing it.
    pub async fn prepare(&self, text: &str) -> VoiceResult<PlaybackHandle> {
        if text.trim().is_empty() {
            return Ok(PlaybackHandle::empty());
        }
        let bytes = self.backend.synthesize(text).await?;
        if bytes.is_empty() {
            debug!("synthesis returned no audio");
            return Ok(PlaybackHandle::empty());
        }
        let audio = tokio::task::spawn_blocking(move || DecodedAudio::decode(bytes))
            .await
            .map_err(|e| VoiceError::Decode(e.to_string()))??;
        if let Some(audio) = &audio {
            debug!(seconds = audio.duration().as_secs_f32(), "speech prepared");
        }
        Ok(PlaybackHandle { audio })
    }

    /// Play prepared speech; resolves when playback has finished. Empty handles are a no-op.
    pub async fn play(&self, handle: PlaybackHandle) -> VoiceResult<()> {
        let Some(audio) = handle.audio else {
            return Ok(());
        };
        let _turn = self.playback.lock().await;
        info!(seconds = audio.duration().as_secs_f32(), "🔊 playing speech");
        self.output.play(audio).await
    }

    /// Synthesize, decode and play `text` as one unit.
    pub async fn speak(&self, text: &str) -> VoiceResult<()> {
        let handle = self.prepare(text).await?;
        self.play(handle).await
    }

    /// Interrupt current playback.
    pub fn stop(&self) {
        self.output.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.output.is_playing()
    }
}
