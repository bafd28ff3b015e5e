//! # avatar-voice - turn-taking for the conversational avatar
//!
//! Listens, asks the completion service for a reply, speaks it, and exposes the signals a
//! renderer needs to animate the avatar in sync with playback.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          TurnController                           │
//! │  ┌────────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ Transcription  │ → │ CompletionService│ → │ SpeechSynthesis │  │
//! │  │ (mic+VAD+STT)  │   │  (avatar-core)   │   │ (TTS + rodio)   │  │
//! │  └────────────────┘   └──────────────────┘   └─────────────────┘  │
//! │          │ state / energy (watch)      events (broadcast) │       │
//! │          └──────────────────→ Presenter ←─────────────────┘       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod controller;
pub mod error;
pub mod microphone;
pub mod presentation;
pub mod synthesis;
pub mod transcription;
pub mod utterance;
pub mod vad;

pub use audio::{AudioCapture, AudioChunk, AudioConfig, AudioOutput, DecodedAudio, SilentOutput, SpeakerOutput};
pub use controller::{AvatarSignals, ControllerConfig, ControllerEvent, TurnController, TurnOutcome};
pub use error::{VoiceError, VoiceResult};
pub use microphone::MicrophoneRecognizer;
pub use presentation::{
    mouth_shape, viseme_index, Gesture, HeadPose, MouthShape, Orb, OrbFrame, PresentationFrame, Presenter,
    Viseme, MOUTH_CYCLE_RATE, VISEMES,
};
pub use synthesis::{ElevenLabsTts, PlaybackHandle, SilentTts, SpeechSynthesisClient, SynthesisBackend};
pub use transcription::{
    encode_wav, RemoteTranscriber, SpeechRecognizer, TranscriptSession, TranscriptionAdapter,
    TranscriptionBackend,
};
pub use utterance::{Utterance, UtteranceConfig, UtteranceDetector};
pub use vad::{VadConfig, VoiceActivityDetector};
