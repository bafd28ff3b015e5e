//! Integration test: speech synthesis and transcription clients against mock HTTP services.
//!
//! ## Scenarios
//! 1. ElevenLabs request shape: path, `xi-api-key`, `Accept`, JSON body.
//! 2. Non-2xx synthesis status is an error, nothing is played.
//! 3. Empty audio body resolves as a no-op.
//! 4. Prepared speech is fully decoded before `play`.
//! 5. Transcription upload: bearer auth, multipart form, JSON `text`.
//! 6. Concurrent `play` calls run one after the other; `stop` ends the current one.

use async_trait::async_trait;
use avatar_core::{SynthesisConfig, TranscriptionConfig};
use avatar_voice::{
    encode_wav, AudioOutput, DecodedAudio, ElevenLabsTts, RemoteTranscriber, SilentOutput,
    SpeechSynthesisClient, SynthesisBackend, TranscriptionBackend, Utterance, VoiceError,
    VoiceResult,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VOICE: &str = "pNInz6obpgDQGcFmaJgB";

/// Records what would have been played.
#[derive(Default)]
struct RecordingOutput {
    played: Mutex<Vec<DecodedAudio>>,
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn play(&self, audio: DecodedAudio) -> VoiceResult<()> {
        self.played.lock().push(audio);
        Ok(())
    }

    fn stop(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

fn tts_for(server: &MockServer) -> ElevenLabsTts {
    let config = SynthesisConfig {
        base_url: server.uri(),
        api_key: Some("eleven-test-key".to_string()),
        timeout_secs: 5,
        ..Default::default()
    };
    ElevenLabsTts::from_config(&config).expect("tts client")
}

fn tone(samples: usize) -> Vec<u8> {
    let pcm: Vec<f32> = (0..samples).map(|i| ((i as f32) * 0.05).sin() * 0.3).collect();
    encode_wav(&pcm, 16000)
}

/// Offline backend: every reply is a tone of fixed length.
struct LocalTone(usize);

#[async_trait]
impl SynthesisBackend for LocalTone {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(tone(self.0))
    }
}

#[tokio::test]
async fn speak_posts_elevenlabs_request_and_plays() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/text-to-speech/{}", VOICE)))
        .and(header("xi-api-key", "eleven-test-key"))
        .and(header("accept", "audio/mpeg"))
        .and(body_json(json!({
            "text": "Hello there!",
            "model_id": "eleven_monolingual_v1",
            "voice_settings": { "stability": 0.5, "similarity_boost": 0.5 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tone(1600)))
        .expect(1)
        .mount(&server)
        .await;

    let output = Arc::new(RecordingOutput::default());
    let client = SpeechSynthesisClient::new(Arc::new(tts_for(&server)), output.clone());
    client.speak("Hello there!").await.expect("speech plays");

    let played = output.played.lock();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].samples.len(), 1600);
    assert_eq!(played[0].duration(), Duration::from_millis(100));
}

#[tokio::test]
async fn synthesis_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let output = Arc::new(RecordingOutput::default());
    let client = SpeechSynthesisClient::new(Arc::new(tts_for(&server)), output.clone());
    let err = client.speak("Hello").await.expect_err("401 fails");
    assert!(matches!(err, VoiceError::Tts(ref msg) if msg.contains("401")));
    assert!(output.played.lock().is_empty());
}

#[tokio::test]
async fn empty_audio_is_a_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let output = Arc::new(RecordingOutput::default());
    let client = SpeechSynthesisClient::new(Arc::new(tts_for(&server)), output.clone());
    let handle = client.prepare("Hello").await.unwrap();
    assert!(handle.is_empty());
    client.play(handle).await.unwrap();
    assert!(output.played.lock().is_empty());
}

#[tokio::test]
async fn prepared_audio_plays_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tone(3200)))
        .expect(1)
        .mount(&server)
        .await;

    let output = Arc::new(RecordingOutput::default());
    let client = SpeechSynthesisClient::new(Arc::new(tts_for(&server)), output.clone());
    let handle = client.prepare("Prepared reply").await.unwrap();
    assert_eq!(handle.duration(), Duration::from_millis(200));

    // Nothing is fetched at play time.
    drop(server);
    client.play(handle).await.unwrap();
    assert_eq!(output.played.lock().len(), 1);
}

#[tokio::test]
async fn remote_transcriber_uploads_wav() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer stt-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": " Tell me a joke. " })))
        .expect(1)
        .mount(&server)
        .await;

    let config = TranscriptionConfig {
        base_url: server.uri(),
        api_key: Some("stt-test-key".to_string()),
        ..Default::default()
    };
    let transcriber = RemoteTranscriber::from_config(&config, Some("en")).unwrap();
    let utterance = Utterance {
        samples: vec![0.1; 8000],
        sample_rate: 16000,
        speech_duration: Duration::from_millis(500),
        committed_at: Utc::now(),
    };
    let text = transcriber.transcribe(&utterance).await.unwrap();
    assert_eq!(text, "Tell me a joke.");

    let requests = server.received_requests().await.expect("recording enabled");
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\"; filename=\"audio.wav\""));
    assert!(body.contains("whisper-1"));
    assert!(body.contains("name=\"language\""));
}

#[tokio::test]
async fn transcription_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = TranscriptionConfig {
        base_url: server.uri(),
        api_key: Some("k".to_string()),
        ..Default::default()
    };
    let transcriber = RemoteTranscriber::from_config(&config, None).unwrap();
    let utterance = Utterance {
        samples: vec![0.1; 800],
        sample_rate: 16000,
        speech_duration: Duration::from_millis(50),
        committed_at: Utc::now(),
    };
    assert!(matches!(transcriber.transcribe(&utterance).await, Err(VoiceError::Stt(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_playback_is_serialized() {
    // 200ms per clip
    let client = Arc::new(SpeechSynthesisClient::new(
        Arc::new(LocalTone(3200)),
        Arc::new(SilentOutput::new()),
    ));
    let first = client.prepare("first").await.unwrap();
    let second = client.prepare("second").await.unwrap();
    let total = first.duration() + second.duration();

    let started = Instant::now();
    let (a, b) = {
        let one = Arc::clone(&client);
        let two = Arc::clone(&client);
        tokio::join!(
            tokio::spawn(async move { one.play(first).await }),
            tokio::spawn(async move { two.play(second).await }),
        )
    };
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    assert!(
        started.elapsed() >= total,
        "playback overlapped: {:?} < {:?}",
        started.elapsed(),
        total
    );
    assert!(!client.is_playing());
}

#[tokio::test]
async fn stop_ends_current_playback() {
    // 5s clip
    let client = Arc::new(SpeechSynthesisClient::new(
        Arc::new(LocalTone(80_000)),
        Arc::new(SilentOutput::new()),
    ));
    let handle = client.prepare("a long story").await.unwrap();
    let playing = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.play(handle).await })
    };

    timeout(Duration::from_secs(2), async {
        while !client.is_playing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("playback starts");

    client.stop();
    timeout(Duration::from_secs(1), playing)
        .await
        .expect("stop resolves playback")
        .unwrap()
        .unwrap();
    assert!(!client.is_playing());
}
