//! Error types for the avatar voice runtime

use avatar_core::ConversationState;
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while listening, synthesizing, playing, or driving a turn
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("VAD processing error: {0}")]
    VadProcessing(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("A listening session is already active")]
    SessionActive,

    #[error("Turn rejected: controller is {0}")]
    Busy(ConversationState),

    #[error("User turn text is empty")]
    EmptyInput,

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<rodio::decoder::DecoderError> for VoiceError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        VoiceError::Decode(err.to_string())
    }
}

impl From<avatar_core::CoreError> for VoiceError {
    fn from(err: avatar_core::CoreError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

impl VoiceError {
    /// True for errors caused by the caller rather than by a service or device.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            VoiceError::Busy(_) | VoiceError::EmptyInput | VoiceError::SessionActive
        )
    }
}
