//! Hardware tests for the microphone recognizer.
//!
//! Note: These tests require audio devices and may not work in CI environments.

use async_trait::async_trait;
use avatar_core::TranscriptionConfig;
use avatar_voice::{
    AudioCapture, MicrophoneRecognizer, SpeechRecognizer, TranscriptionAdapter,
    TranscriptionBackend, Utterance, VoiceResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Reports the utterance length instead of calling a transcription service.
struct DurationBackend;

#[async_trait]
impl TranscriptionBackend for DurationBackend {
    async fn transcribe(&self, utterance: &Utterance) -> VoiceResult<String> {
        Ok(format!("{:.1}s of speech", utterance.speech_duration.as_secs_f32()))
    }
}

#[test]
#[ignore] // Requires audio hardware
fn lists_input_devices() {
    let devices = AudioCapture::list_input_devices().expect("host enumerates devices");
    println!("input devices: {:?}", devices);
}

#[tokio::test]
#[ignore] // Requires audio hardware and manual speech
async fn captures_one_utterance() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    println!("\n🎤 Please speak into your microphone within 10 seconds...\n");
    let recognizer = MicrophoneRecognizer::new(&TranscriptionConfig::default(), Arc::new(DurationBackend));
    match timeout(Duration::from_secs(10), recognizer.recognize_utterance()).await {
        Ok(result) => println!("recognized: {:?}", result.expect("capture succeeds")),
        Err(_) => println!("⏱️ no speech detected within 10 seconds"),
    }
}

#[tokio::test]
#[ignore] // Requires audio hardware
async fn cancelled_session_releases_microphone() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let recognizer = MicrophoneRecognizer::new(&TranscriptionConfig::default(), Arc::new(DurationBackend));
    let adapter = TranscriptionAdapter::new(Arc::new(recognizer));
    let session = adapter.begin_session().expect("session starts");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(adapter.end_session());
    assert_eq!(session.transcript().await, None);

    // The device is free again for a new session.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let again = adapter.begin_session().expect("second session starts");
    adapter.end_session();
    assert_eq!(again.transcript().await, None);
}
