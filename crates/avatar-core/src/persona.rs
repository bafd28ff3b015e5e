//! Persona: who the avatar is and how it sounds.
//!
//! Static configuration loaded once at startup. The `context` field is the system prompt
//! prepended to every completion request.

use serde::{Deserialize, Serialize};

/// Voice profile of the persona. Display-only values; the synthesis voice itself is
/// selected by the TTS backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    /// Display name of the voice.
    pub name: String,
    /// BCP-47 language tag (e.g. `en-GB`).
    pub language: String,
    pub pitch: f32,
    pub rate: f32,
}

impl VoiceProfile {
    /// Primary language subtag (`en-GB` -> `en`), as expected by transcription APIs.
    pub fn primary_language(&self) -> Option<&str> {
        self.language
            .split(['-', '_'])
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            name: "Google UK English Female".to_string(),
            language: "en-GB".to_string(),
            pitch: 1.1,
            rate: 0.9,
        }
    }
}

/// The character the avatar plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    pub personality: String,
    /// System prompt for the completion service.
    pub context: String,
    pub voice: VoiceProfile,
}

impl Persona {
    pub fn system_prompt(&self) -> &str {
        &self.context
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Luna".to_string(),
            personality: "Friendly and knowledgeable AI assistant with a warm personality. \
                Speaks clearly and concisely with a hint of enthusiasm."
                .to_string(),
            context: "You are Luna, an AI assistant who helps users with their questions and tasks. \
                You communicate in a friendly and professional manner."
                .to_string(),
            voice: VoiceProfile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_persona_is_luna() {
        let persona = Persona::default();
        assert_eq!(persona.name, "Luna");
        assert!(persona.system_prompt().starts_with("You are Luna"));
    }

    #[test]
    fn primary_language_strips_region() {
        let mut voice = VoiceProfile::default();
        assert_eq!(voice.primary_language(), Some("en"));
        voice.language = "pt_BR".to_string();
        assert_eq!(voice.primary_language(), Some("pt"));
        voice.language = String::new();
        assert_eq!(voice.primary_language(), None);
    }
}
