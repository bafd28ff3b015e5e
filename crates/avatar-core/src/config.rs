//! Application configuration loaded at startup.
//!
//! Sources, lowest to highest precedence:
//!
//! | Source | Example |
//! |--------|---------|
//! | built-in defaults | Luna persona, Groq + ElevenLabs endpoints |
//! | TOML file (`AVATAR_CONFIG`, default `config/avatar.toml`) | `[completion] model = "llama3-70b-8192"` |
//! | environment, prefix `AVATAR_`, `__` nesting | `AVATAR_CONVERSATION__CONTINUOUS=true` |
//!
//! API keys left unset by all three fall back to the provider variables
//! `GROQ_API_KEY`, `ELEVENLABS_API_KEY` and `STT_API_KEY` / `OPENAI_API_KEY`.

use crate::persona::Persona;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/avatar";

/// Chat-completion service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "mixtral-8x7b-32768".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

/// How the controller drives synthesis for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Network, decode and playback as one awaited unit.
    Speak,
    /// Decode fully first, then play with no further network latency.
    PrepareThenPlay,
}

/// Text-to-speech service settings (ElevenLabs wire format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout_secs: u64,
    pub mode: SynthesisMode,
    pub api_key: Option<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "pNInz6obpgDQGcFmaJgB".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            timeout_secs: 60,
            mode: SynthesisMode::Speak,
            api_key: None,
        }
    }
}

/// Speech recognition settings: microphone endpointing plus the transcription API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL of an OpenAI-compatible API, without trailing slash.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    pub sample_rate: u32,
    /// Silence after speech that ends the utterance.
    pub gap_ms: u64,
    /// Utterances shorter than this are dropped.
    pub min_speech_ms: u64,
    pub max_utterance_secs: u64,
    /// WebRTC VAD aggressiveness, 0-3.
    pub vad_mode: u8,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            timeout_secs: 30,
            api_key: None,
            sample_rate: 16000,
            gap_ms: 800,
            min_speech_ms: 200,
            max_utterance_secs: 30,
            vad_mode: 2,
        }
    }
}

/// Turn-taking behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Grace delay between triggering audio and revealing the reply text.
    pub reveal_delay_ms: u64,
    /// Resume listening after each spoken reply of a voice turn.
    pub continuous: bool,
    /// Speak fallback replies produced by a failed completion call.
    pub speak_fallback_replies: bool,
    pub energy_drain: u8,
    pub energy_restore: u8,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            reveal_delay_ms: 100,
            continuous: false,
            speak_fallback_replies: true,
            energy_drain: 10,
            energy_restore: 20,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub persona: Persona,
    pub completion: CompletionConfig,
    pub synthesis: SynthesisConfig,
    pub transcription: TranscriptionConfig,
    pub conversation: ConversationConfig,
}

impl AppConfig {
    /// Load from the default locations (see module docs) and resolve API keys.
    pub fn load() -> Result<Self, CoreError> {
        let path = std::env::var("AVATAR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false));
        let mut loaded: AppConfig = Self::with_environment(builder).build()?.try_deserialize()?;
        loaded.resolve_api_keys();
        Ok(loaded)
    }

    /// Load from an explicit TOML file (must exist), then environment, then key fallbacks.
    pub fn load_from_path(path: &Path) -> Result<Self, CoreError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml));
        let mut loaded: AppConfig = Self::with_environment(builder).build()?.try_deserialize()?;
        loaded.resolve_api_keys();
        Ok(loaded)
    }

    fn with_environment(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> config::ConfigBuilder<config::builder::DefaultState> {
        builder.add_source(
            config::Environment::with_prefix("AVATAR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Fill unset API keys from provider environment variables.
    pub fn resolve_api_keys(&mut self) {
        resolve_key(&mut self.completion.api_key, &["GROQ_API_KEY"]);
        resolve_key(&mut self.synthesis.api_key, &["ELEVENLABS_API_KEY"]);
        resolve_key(&mut self.transcription.api_key, &["STT_API_KEY", "OPENAI_API_KEY"]);
    }

    /// Write this configuration as pretty TOML, without API keys.
    pub fn save_template(&self, path: &Path) -> Result<(), CoreError> {
        let mut redacted = self.clone();
        redacted.completion.api_key = None;
        redacted.synthesis.api_key = None;
        redacted.transcription.api_key = None;
        let content = toml::to_string_pretty(&redacted)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}

fn resolve_key(slot: &mut Option<String>, vars: &[&str]) {
    if slot.as_deref().map(str::trim).is_some_and(|k| !k.is_empty()) {
        return;
    }
    *slot = vars.iter().find_map(|name| env_opt_string(name));
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_hosted_services() {
        let config = AppConfig::default();
        assert_eq!(config.completion.model, "mixtral-8x7b-32768");
        assert!((config.completion.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.synthesis.model_id, "eleven_monolingual_v1");
        assert_eq!(config.synthesis.mode, SynthesisMode::Speak);
        assert_eq!(config.conversation.reveal_delay_ms, 100);
        assert_eq!(config.transcription.gap_ms, 800);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[persona]
name = "Nova"
personality = "Dry wit"
context = "You are Nova."

[completion]
model = "llama3-70b-8192"
api_key = "from-file"

[synthesis]
mode = "prepare_then_play"

[conversation]
continuous = true
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.persona.name, "Nova");
        assert_eq!(config.persona.system_prompt(), "You are Nova.");
        assert_eq!(config.persona.voice.language, "en-GB");
        assert_eq!(config.completion.model, "llama3-70b-8192");
        assert_eq!(config.completion.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.completion.max_tokens, 1024);
        assert_eq!(config.synthesis.mode, SynthesisMode::PrepareThenPlay);
        assert!(config.conversation.continuous);
        assert_eq!(config.conversation.energy_drain, 10);
    }

    #[test]
    fn partial_persona_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[persona]
name = "Nova"

[persona.voice]
language = "fr-FR"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        let defaults = Persona::default();
        assert_eq!(config.persona.name, "Nova");
        assert_eq!(config.persona.context, defaults.context);
        assert_eq!(config.persona.personality, defaults.personality);
        assert_eq!(config.persona.voice.primary_language(), Some("fr"));
        assert_eq!(config.persona.voice.rate, defaults.voice.rate);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load_from_path(&dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn template_round_trips_without_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("avatar.toml");
        let mut config = AppConfig::default();
        config.synthesis.api_key = Some("secret".to_string());
        config.conversation.reveal_delay_ms = 250;
        config.save_template(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret"));
        let parsed: AppConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed.conversation.reveal_delay_ms, 250);
        assert_eq!(parsed.synthesis.api_key, None);
    }

    #[test]
    fn configured_key_is_kept() {
        let mut slot = Some("configured".to_string());
        resolve_key(&mut slot, &["AVATAR_TEST_UNSET_KEY_VARIABLE"]);
        assert_eq!(slot.as_deref(), Some("configured"));

        let mut empty = Some("  ".to_string());
        resolve_key(&mut empty, &["AVATAR_TEST_UNSET_KEY_VARIABLE"]);
        assert_eq!(empty, None);
    }
}
