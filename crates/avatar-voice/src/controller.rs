//! Turn controller: the conversation state machine.
//!
//! ```text
//!            listen_once / converse            transcript
//!   Idle ------------------------------> Listening -----------> AwaitingReply
//!    ^  \                                    |                        |
//!    |   \ submit_user_turn                  | cancelled / nothing    | reply
//!    |    +-------------------------------------------------------->  v
//!    |                                       |                     Speaking
//!    +---------------------------------------+------------------------+
//!                 playback done (Listening again when continuous)
//! ```
//!
//! The controller is the only writer of the state. Every turn starts with a compare-and-set
//! from `Idle`, so at most one turn (and one completion request) is in flight; a turn that
//! cannot start is rejected with [`VoiceError::Busy`]. Every exit path, including dropping
//! the turn future, ends in `Idle`.

use crate::error::{VoiceError, VoiceResult};
use crate::synthesis::SpeechSynthesisClient;
use crate::transcription::{SpeechRecognizer, TranscriptionAdapter};
use avatar_core::{
    AppConfig, CompletionService, ConversationConfig, ConversationHistory, ConversationMessage,
    ConversationState, DegradedReason, EnergyLevel, Persona, SynthesisMode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Turn-taking behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Delay between triggering audio and revealing the reply text.
    pub reveal_delay: Duration,
    /// After a spoken reply of a voice turn, listen again.
    pub continuous: bool,
    pub synthesis_mode: SynthesisMode,
    /// Whether fallback replies from a failed completion are spoken or only shown.
    pub speak_fallback_replies: bool,
    pub energy_drain: u8,
    pub energy_restore: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_settings(&ConversationConfig::default(), SynthesisMode::Speak)
    }
}

impl ControllerConfig {
    pub fn from_settings(conversation: &ConversationConfig, synthesis_mode: SynthesisMode) -> Self {
        Self {
            reveal_delay: Duration::from_millis(conversation.reveal_delay_ms),
            continuous: conversation.continuous,
            synthesis_mode,
            speak_fallback_replies: conversation.speak_fallback_replies,
            energy_drain: conversation.energy_drain,
            energy_restore: conversation.energy_restore,
        }
    }
}

impl From<&AppConfig> for ControllerConfig {
    fn from(config: &AppConfig) -> Self {
        Self::from_settings(&config.conversation, config.synthesis.mode)
    }
}

/// What the presentation layer observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvatarSignals {
    pub state: ConversationState,
    pub energy: EnergyLevel,
}

impl Default for AvatarSignals {
    fn default() -> Self {
        Self {
            state: ConversationState::Idle,
            energy: EnergyLevel::full(),
        }
    }
}

impl AvatarSignals {
    /// Raised before playback is requested and lowered once it has finished or failed.
    pub fn is_speaking(&self) -> bool {
        self.state == ConversationState::Speaking
    }

    pub fn is_listening(&self) -> bool {
        self.state == ConversationState::Listening
    }
}

/// Observable controller events, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
    /// A user message was appended to the history.
    UserMessage(ConversationMessage),
    /// The assistant reply may be displayed. Emitted after audio was triggered and before
    /// playback completes.
    ReplyRevealed {
        message: ConversationMessage,
        degraded: bool,
    },
    TurnFailed {
        reason: String,
    },
}

/// Result of one completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub user: ConversationMessage,
    pub reply: ConversationMessage,
    /// Set when the reply is a fallback rather than model output.
    pub degraded: Option<DegradedReason>,
    /// True when the reply went through synthesis and playback.
    pub spoken: bool,
}

/// Drives listen, complete, speak.
pub struct TurnController {
    persona: Persona,
    completion: Arc<dyn CompletionService>,
    synthesis: Arc<SpeechSynthesisClient>,
    transcription: Option<TranscriptionAdapter>,
    config: ControllerConfig,
    signals: watch::Sender<AvatarSignals>,
    events: broadcast::Sender<ControllerEvent>,
    history: RwLock<ConversationHistory>,
}

impl TurnController {
    pub fn new(
        persona: Persona,
        completion: Arc<dyn CompletionService>,
        synthesis: Arc<SpeechSynthesisClient>,
        config: ControllerConfig,
    ) -> Self {
        let (signals, _) = watch::channel(AvatarSignals::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(persona = %persona.name, mode = ?config.synthesis_mode, "🎭 turn controller ready");
        Self {
            persona,
            completion,
            synthesis,
            transcription: None,
            config,
            signals,
            events,
            history: RwLock::new(ConversationHistory::new()),
        }
    }

    /// Enable voice turns (`listen_once`, `converse`).
    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.transcription = Some(TranscriptionAdapter::new(recognizer));
        self
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ConversationState {
        self.signals.borrow().state
    }

    pub fn signals(&self) -> watch::Receiver<AvatarSignals> {
        self.signals.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the conversation so far.
    pub async fn history(&self) -> ConversationHistory {
        self.history.read().await.clone()
    }

    /// Typed turn: Idle -> AwaitingReply -> Speaking -> Idle.
    pub async fn submit_user_turn(&self, text: &str) -> VoiceResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::EmptyInput);
        }
        self.enter(ConversationState::AwaitingReply)?;
        let mut guard = TurnGuard::new(self);
        let result = self.respond(text.to_string()).await;
        self.set_state(ConversationState::Idle);
        guard.disarm();
        result
    }

    /// Voice turn: listen for one utterance, then respond to it.
    ///
    /// `Ok(None)` when listening was cancelled or nothing was recognized.
    pub async fn listen_once(&self) -> VoiceResult<Option<TurnOutcome>> {
        self.recognizer()?;
        self.enter(ConversationState::Listening)?;
        self.listen_turn(ConversationState::Idle).await
    }

    /// Voice turns back to back while continuous mode is on. Stops on cancellation, an empty
    /// session, an unspoken reply or an error. Returns the number of completed turns.
    pub async fn converse(&self) -> VoiceResult<usize> {
        self.recognizer()?;
        self.enter(ConversationState::Listening)?;
        let after = if self.config.continuous {
            ConversationState::Listening
        } else {
            ConversationState::Idle
        };

        let mut turns = 0;
        while let Some(outcome) = self.listen_turn(after).await? {
            turns += 1;
            if !outcome.spoken || self.state() != ConversationState::Listening {
                break;
            }
        }
        info!(turns, "conversation paused");
        Ok(turns)
    }

    /// End the active listening session without delivering a transcript. Only affects the
    /// Listening state; an in-flight completion or playback is never interrupted.
    pub fn cancel_listening(&self) -> bool {
        if self.state() != ConversationState::Listening {
            return false;
        }
        self.transcription
            .as_ref()
            .is_some_and(TranscriptionAdapter::end_session)
    }

    /// Cut the current reply short. Only affects the Speaking state; the turn then finishes
    /// as if playback had ended.
    pub fn stop_speaking(&self) -> bool {
        if self.state() != ConversationState::Speaking {
            return false;
        }
        info!("🔇 stopping playback");
        self.synthesis.stop();
        true
    }

    fn recognizer(&self) -> VoiceResult<&TranscriptionAdapter> {
        self.transcription
            .as_ref()
            .ok_or_else(|| VoiceError::Config("no speech recognizer configured".to_string()))
    }

    /// Runs with the state already `Listening`; leaves it at `after` when a reply was
    /// spoken, `Idle` otherwise.
    async fn listen_turn(&self, after: ConversationState) -> VoiceResult<Option<TurnOutcome>> {
        let mut guard = TurnGuard::new(self);
        let result = self.listen_and_respond().await;
        let next = match &result {
            Ok(Some(outcome)) if outcome.spoken => after,
            _ => ConversationState::Idle,
        };
        self.set_state(next);
        guard.disarm();
        result
    }

    async fn listen_and_respond(&self) -> VoiceResult<Option<TurnOutcome>> {
        let session = self.recognizer()?.begin_session()?;
        info!(session = session.id(), "👂 listening");
        let Some(text) = session.transcript().await else {
            info!("listening ended without a transcript");
            return Ok(None);
        };
        debug!(%text, "transcript received");
        self.set_state(ConversationState::AwaitingReply);
        self.respond(text).await.map(Some)
    }

    /// Runs with the state already `AwaitingReply`. The caller sets the final state.
    async fn respond(&self, text: String) -> VoiceResult<TurnOutcome> {
        let user = ConversationMessage::user(text);
        let snapshot = {
            let mut history = self.history.write().await;
            history.push(user.clone());
            history.messages().to_vec()
        };
        self.emit(ControllerEvent::UserMessage(user.clone()));
        let drain = self.config.energy_drain;
        self.signals.send_modify(|s| s.energy.drain(drain));

        info!(messages = snapshot.len(), "💭 requesting completion");
        let completion = self
            .completion
            .complete(&snapshot, self.persona.system_prompt())
            .await;
        let reply = ConversationMessage::assistant(completion.text);
        self.history.write().await.push(reply.clone());
        let degraded = completion.degraded;

        if let Some(reason) = &degraded {
            warn!(?reason, "completion degraded, using fallback reply");
            if !self.config.speak_fallback_replies {
                self.reveal(&reply, true);
                self.emit(ControllerEvent::TurnFailed {
                    reason: format!("completion failed: {:?}", reason),
                });
                return Ok(TurnOutcome {
                    user,
                    reply,
                    degraded,
                    spoken: false,
                });
            }
        }

        self.set_state(ConversationState::Speaking);
        if let Err(e) = self.voice_reply(&reply, degraded.is_some()).await {
            error!(error = %e, "speech synthesis failed, reply left unspoken");
            self.emit(ControllerEvent::TurnFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }

        let restore = self.config.energy_restore;
        self.signals.send_modify(|s| s.energy.restore(restore));
        debug!("reply spoken");
        Ok(TurnOutcome {
            user,
            reply,
            degraded,
            spoken: true,
        })
    }

    /// Trigger audio, reveal the text after the grace delay, then wait for playback.
    async fn voice_reply(&self, reply: &ConversationMessage, degraded: bool) -> VoiceResult<()> {
        let synthesis = Arc::clone(&self.synthesis);
        let text = reply.content().to_string();
        match self.config.synthesis_mode {
            SynthesisMode::Speak => {
                let mut task = SynthesisTask(tokio::spawn(async move { synthesis.speak(&text).await }));
                tokio::time::sleep(self.config.reveal_delay).await;
                self.reveal(reply, degraded);
                task.join().await?
            }
            SynthesisMode::PrepareThenPlay => {
                let mut task = SynthesisTask(tokio::spawn(async move { synthesis.prepare(&text).await }));
                tokio::time::sleep(self.config.reveal_delay).await;
                self.reveal(reply, degraded);
                let handle = task.join().await??;
                self.synthesis.play(handle).await
            }
        }
    }

    fn reveal(&self, message: &ConversationMessage, degraded: bool) {
        self.emit(ControllerEvent::ReplyRevealed {
            message: message.clone(),
            degraded,
        });
    }

    /// Start a turn: Idle -> `to`, or `Busy` with the current state.
    fn enter(&self, to: ConversationState) -> VoiceResult<()> {
        let mut current = ConversationState::Idle;
        let entered = self.signals.send_if_modified(|s| {
            current = s.state;
            if s.state == ConversationState::Idle {
                s.state = to;
                true
            } else {
                false
            }
        });
        if !entered {
            debug!(state = %current, "turn rejected, controller busy");
            return Err(VoiceError::Busy(current));
        }
        self.emit(ControllerEvent::StateChanged {
            from: ConversationState::Idle,
            to,
        });
        Ok(())
    }

    fn set_state(&self, to: ConversationState) {
        let mut from = to;
        self.signals.send_if_modified(|s| {
            from = s.state;
            if s.state == to {
                false
            } else {
                s.state = to;
                true
            }
        });
        if from != to {
            debug!(%from, %to, "state changed");
            self.emit(ControllerEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Resets the controller to Idle if a turn future is dropped mid-flight, silencing any
/// reply that is still playing.
struct TurnGuard<'a> {
    controller: &'a TurnController,
    armed: bool,
}

impl<'a> TurnGuard<'a> {
    fn new(controller: &'a TurnController) -> Self {
        Self {
            controller,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let state = self.controller.state();
        warn!(%state, "turn abandoned, resetting to idle");
        if let Some(adapter) = &self.controller.transcription {
            adapter.end_session();
        }
        // Device playback outlives the dropped future.
        if state == ConversationState::Speaking {
            self.controller.synthesis.stop();
        }
        self.controller.set_state(ConversationState::Idle);
    }
}

/// Synthesis running alongside the reveal delay; aborted if the turn is abandoned.
struct SynthesisTask<T>(JoinHandle<VoiceResult<T>>);

impl<T> SynthesisTask<T> {
    async fn join(&mut self) -> VoiceResult<VoiceResult<T>> {
        (&mut self.0)
            .await
            .map_err(|e| VoiceError::Tts(format!("synthesis task failed: {}", e)))
    }
}

impl<T> Drop for SynthesisTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
