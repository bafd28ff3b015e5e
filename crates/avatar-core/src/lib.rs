//! avatar-core: persona, conversation model, configuration, and the completion client.
//!
//! Everything here is independent of audio. The turn controller in `avatar-voice` consumes
//! these types; front-ends only need `AppConfig` to wire the services together.

pub mod completion;
pub mod config;
pub mod conversation;
mod error;
pub mod persona;

pub use completion::{
    ChatCompletionClient, Completion, CompletionService, DegradedReason, FALLBACK_EMPTY_REPLY,
    FALLBACK_ERROR_REPLY,
};
pub use config::{
    AppConfig, CompletionConfig, ConversationConfig, SynthesisConfig, SynthesisMode,
    TranscriptionConfig,
};
pub use conversation::{ConversationHistory, ConversationMessage, ConversationState, EnergyLevel, Role};
pub use error::CoreError;
pub use persona::{Persona, VoiceProfile};
