//! Avatar console: talk to the avatar from a terminal.
//!
//! Plain lines are typed turns. Commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/listen` | voice turn(s) from the microphone (continuous if configured) |
//! | `/stop` | cancel listening |
//! | `/hush` | cut the current reply short |
//! | `/history` | print the conversation |
//! | `/quit` | exit |
//!
//! `avatar-console init-config [path]` writes a configuration template and exits.

use avatar_core::{AppConfig, ChatCompletionClient};
use avatar_voice::{
    AudioOutput, ControllerConfig, ControllerEvent, ElevenLabsTts, MicrophoneRecognizer, Presenter,
    RemoteTranscriber, SilentOutput, SilentTts, SpeakerOutput, SpeechSynthesisClient,
    SynthesisBackend, TurnController,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_FILE: &str = "config/avatar.toml";

/// ~30 fps presentation loop.
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[avatar-console] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("init-config") {
        let path = PathBuf::from(args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_FILE));
        match AppConfig::default().save_template(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "configuration template written"),
            Err(e) => {
                tracing::error!(error = %e, "could not write configuration template");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let controller = match build_controller(&config) {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            tracing::error!(error = %e, "failed to start avatar");
            std::process::exit(1);
        }
    };

    tracing::info!(
        persona = %config.persona.name,
        model = %config.completion.model,
        mode = ?config.synthesis.mode,
        "Avatar console started"
    );
    println!(
        "{} is here. Type a message, /listen, /stop, /hush, /history or /quit.",
        config.persona.name
    );

    tokio::spawn(print_events(config.persona.name.clone(), controller.subscribe()));
    tokio::spawn(present(controller.signals()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !dispatch(&controller, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down");
                break;
            }
        }
    }
    controller.cancel_listening();
    controller.stop_speaking();
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Wire the services from configuration. Synthesis and recognition degrade to text-only
/// when their keys or devices are missing; the completion service is required.
fn build_controller(config: &AppConfig) -> Result<TurnController, BoxError> {
    let completion = ChatCompletionClient::from_config(&config.completion)?;
    tracing::debug!(model = completion.model(), "completion client ready");
    let completion = Arc::new(completion);

    let tts: Arc<dyn SynthesisBackend> = match ElevenLabsTts::from_config(&config.synthesis) {
        Ok(tts) => Arc::new(tts),
        Err(e) => {
            tracing::warn!(error = %e, "speech synthesis disabled, replies will be text only");
            Arc::new(SilentTts)
        }
    };
    let output: Arc<dyn AudioOutput> = match SpeakerOutput::new() {
        Ok(output) => Arc::new(output),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output device, playback is silent");
            Arc::new(SilentOutput::new())
        }
    };
    let synthesis = Arc::new(SpeechSynthesisClient::new(tts, output));

    let mut controller = TurnController::new(
        config.persona.clone(),
        completion,
        synthesis,
        ControllerConfig::from(config),
    );

    let language = config.persona.voice.primary_language();
    match RemoteTranscriber::from_config(&config.transcription, language) {
        Ok(transcriber) => {
            let recognizer = MicrophoneRecognizer::new(&config.transcription, Arc::new(transcriber));
            controller = controller.with_recognizer(Arc::new(recognizer));
        }
        Err(e) => tracing::warn!(error = %e, "voice input disabled, /listen unavailable"),
    }

    Ok(controller)
}

/// Handle one input line. Returns false to quit.
async fn dispatch(controller: &Arc<TurnController>, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" | "/exit" => return false,
        "/stop" => {
            if !controller.cancel_listening() {
                println!("(not listening)");
            }
        }
        "/hush" => {
            if !controller.stop_speaking() {
                println!("(not speaking)");
            }
        }
        "/history" => {
            let history = controller.history().await;
            if history.is_empty() {
                println!("(no messages yet)");
            }
            for message in history.messages() {
                println!("[{}] {}", message.role().as_str(), message.content());
            }
        }
        "/listen" => {
            let controller = Arc::clone(controller);
            tokio::spawn(async move {
                match controller.converse().await {
                    Ok(turns) => tracing::debug!(turns, "listening finished"),
                    Err(e) if e.is_rejection() => println!("(busy: {})", e),
                    Err(e) => tracing::error!(error = %e, "voice turn failed"),
                }
            });
        }
        text => {
            let controller = Arc::clone(controller);
            let text = text.to_string();
            tokio::spawn(async move {
                match controller.submit_user_turn(&text).await {
                    Ok(outcome) if outcome.degraded.is_some() => {
                        tracing::warn!(reason = ?outcome.degraded, "reply was a fallback")
                    }
                    Ok(_) => {}
                    Err(e) if e.is_rejection() => println!("(busy: {})", e),
                    Err(e) => tracing::error!(error = %e, "turn failed"),
                }
            });
        }
    }
    true
}

/// Render the transcript from controller events.
async fn print_events(name: String, mut events: broadcast::Receiver<ControllerEvent>) {
    loop {
        match events.recv().await {
            Ok(ControllerEvent::UserMessage(message)) => println!("You: {}", message.content()),
            Ok(ControllerEvent::ReplyRevealed { message, degraded }) => {
                let marker = if degraded { " (!)" } else { "" };
                println!("{}{}: {}", name, marker, message.content());
            }
            Ok(ControllerEvent::StateChanged { from, to }) => {
                tracing::info!(%from, %to, "avatar state");
            }
            Ok(ControllerEvent::TurnFailed { reason }) => {
                tracing::warn!(%reason, "turn failed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Presentation loop: derives one frame per tick. A renderer would draw these; the console
/// logs them at trace level and reports energy changes.
async fn present(signals: watch::Receiver<avatar_voice::AvatarSignals>) {
    let mut presenter = Presenter::new(Instant::now());
    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    let mut energy = signals.borrow().energy;
    loop {
        interval.tick().await;
        let current = *signals.borrow();
        if current.energy != energy {
            energy = current.energy;
            tracing::info!(energy = energy.value(), "⚡ energy");
        }
        let frame = presenter.frame(&current, Instant::now());
        tracing::trace!(
            viseme = ?frame.mouth.viseme,
            intensity = frame.mouth.intensity,
            yaw = frame.head.yaw,
            gesture = ?frame.gesture,
            sparkles = frame.sparkles,
            listening = frame.orb.pulsing,
            "frame"
        );
    }
}
