//! Utterance endpointing: the "gap" logic that decides when the user has finished.
//!
//! Driven by per-frame VAD decisions and counted in samples, so the outcome depends only on
//! the audio, not on wall-clock scheduling of the capture thread.
//!
//! ```text
//! Waiting --speech--> Speech --silence--> Gap --silence >= gap--> commit
//!                       ^                  |
//!                       +-----speech-------+
//! ```

use avatar_core::TranscriptionConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Endpointing thresholds
#[derive(Debug, Clone)]
pub struct UtteranceConfig {
    pub sample_rate: u32,

    /// Silence after speech that commits the utterance (default: 800ms)
    pub gap: Duration,

    /// Utterances with less speech than this are discarded (default: 200ms)
    pub min_speech: Duration,

    /// Hard cap; the utterance is committed when reached (default: 30s)
    pub max_duration: Duration,
}

impl Default for UtteranceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            gap: Duration::from_millis(800),
            min_speech: Duration::from_millis(200),
            max_duration: Duration::from_secs(30),
        }
    }
}

impl From<&TranscriptionConfig> for UtteranceConfig {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            gap: Duration::from_millis(config.gap_ms),
            min_speech: Duration::from_millis(config.min_speech_ms),
            max_duration: Duration::from_secs(config.max_utterance_secs),
        }
    }
}

impl UtteranceConfig {
    fn samples_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize
    }
}

/// One committed stretch of user speech, mono PCM.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Speech content, excluding trailing silence.
    pub speech_duration: Duration,
    pub committed_at: DateTime<Utc>,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Speech,
    Gap,
}

/// Accumulates frames between speech onset and the closing gap.
pub struct UtteranceDetector {
    config: UtteranceConfig,
    phase: Phase,
    buffer: Vec<f32>,
    speech_samples: usize,
    silence_samples: usize,
    gap_samples: usize,
    min_speech_samples: usize,
    max_samples: usize,
}

impl UtteranceDetector {
    pub fn new(config: UtteranceConfig) -> Self {
        let gap_samples = config.samples_for(config.gap);
        let min_speech_samples = config.samples_for(config.min_speech);
        let max_samples = config.samples_for(config.max_duration);
        Self {
            config,
            phase: Phase::Waiting,
            buffer: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
            gap_samples,
            min_speech_samples,
            max_samples,
        }
    }

    /// Feed one VAD-classified frame. Returns the utterance when this frame completes one.
    pub fn push_frame(&mut self, frame: &[f32], is_speech: bool) -> Option<Utterance> {
        match (self.phase, is_speech) {
            (Phase::Waiting, false) => return None,
            (Phase::Waiting, true) => {
                debug!("🎤 speech started");
                self.phase = Phase::Speech;
                self.buffer.clear();
                self.buffer.extend_from_slice(frame);
                self.speech_samples = frame.len();
                self.silence_samples = 0;
            }
            (Phase::Speech | Phase::Gap, true) => {
                self.phase = Phase::Speech;
                self.buffer.extend_from_slice(frame);
                self.speech_samples += frame.len();
                self.silence_samples = 0;
            }
            (Phase::Speech | Phase::Gap, false) => {
                self.phase = Phase::Gap;
                self.buffer.extend_from_slice(frame);
                self.silence_samples += frame.len();
                if self.silence_samples >= self.gap_samples {
                    info!("✅ gap reached, committing utterance");
                    return self.commit();
                }
            }
        }

        if self.max_samples > 0 && self.buffer.len() >= self.max_samples {
            warn!("⏱️ max utterance length reached, committing");
            return self.commit();
        }
        None
    }

    /// Commit whatever speech is buffered, e.g. when the audio source ends.
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.phase == Phase::Waiting {
            return None;
        }
        self.commit()
    }

    /// True once speech has started and not yet been committed.
    pub fn in_speech(&self) -> bool {
        self.phase != Phase::Waiting
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Waiting;
        self.buffer.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }

    fn commit(&mut self) -> Option<Utterance> {
        let speech_samples = self.speech_samples;
        let samples = std::mem::take(&mut self.buffer);
        self.reset();

        if speech_samples < self.min_speech_samples {
            debug!(speech_samples, "⏭️ speech too short, discarded");
            return None;
        }

        Some(Utterance {
            samples,
            sample_rate: self.config.sample_rate,
            speech_duration: samples_to_duration(speech_samples, self.config.sample_rate),
            committed_at: Utc::now(),
        })
    }
}

pub(crate) fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(samples as u64 * 1_000_000_000 / u64::from(sample_rate))
}
