//! Voice activity detection using WebRTC VAD.
//!
//! Frames must be 10, 20 or 30 ms long; the recognizer always feeds 30 ms frames.

use crate::error::{VoiceError, VoiceResult};
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Configuration for VAD detection
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz)
    pub sample_rate: u32,

    /// Aggressiveness (0-3, where 3 filters the most non-speech)
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 2,
        }
    }
}

impl VadConfig {
    /// Samples in one 30 ms frame.
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as usize * 30) / 1000
    }

    fn webrtc_rate(&self) -> VoiceResult<SampleRate> {
        match self.sample_rate {
            8000 => Ok(SampleRate::Rate8kHz),
            16000 => Ok(SampleRate::Rate16kHz),
            32000 => Ok(SampleRate::Rate32kHz),
            48000 => Ok(SampleRate::Rate48kHz),
            other => Err(VoiceError::Config(format!(
                "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                other
            ))),
        }
    }

    fn webrtc_mode(&self) -> VoiceResult<VadMode> {
        match self.mode {
            0 => Ok(VadMode::Quality),
            1 => Ok(VadMode::LowBitrate),
            2 => Ok(VadMode::Aggressive),
            3 => Ok(VadMode::VeryAggressive),
            other => Err(VoiceError::Config(format!("VAD mode must be 0-3, got {}", other))),
        }
    }
}

/// Speech/silence classifier for fixed-size frames. Not `Send`; create it on the thread
/// that consumes the audio.
pub struct VoiceActivityDetector {
    vad: Vad,
    config: VadConfig,
    frame_size: usize,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let rate = config.webrtc_rate()?;
        let mode = config.webrtc_mode()?;
        let frame_size = config.frame_size();
        let vad = build_vad(rate, mode);
        info!(
            sample_rate = config.sample_rate,
            mode = config.mode,
            frame_size,
            "🎙️ VAD initialized"
        );
        Ok(Self {
            vad,
            config,
            frame_size,
        })
    }

    /// Classify one frame of exactly `frame_size()` samples.
    pub fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool> {
        if frame.len() != self.frame_size {
            return Err(VoiceError::VadProcessing(format!(
                "Expected {} samples, got {}",
                self.frame_size,
                frame.len()
            )));
        }

        let pcm: Vec<i16> = frame
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        let speech = self
            .vad
            .is_voice_segment(&pcm)
            .map_err(|_| VoiceError::VadProcessing("invalid frame length".to_string()))?;
        debug!(speech, "vad frame");
        Ok(speech)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

fn build_vad(rate: SampleRate, mode: VadMode) -> Vad {
    let mut vad = Vad::new();
    vad.set_mode(mode);
    vad.set_sample_rate(rate);
    vad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_thirty_ms() {
        let detector = VoiceActivityDetector::new(VadConfig::default()).unwrap();
        assert_eq!(detector.frame_size(), 480);

        let config = VadConfig {
            sample_rate: 48000,
            ..Default::default()
        };
        assert_eq!(config.frame_size(), 1440);
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        let config = VadConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(matches!(VoiceActivityDetector::new(config), Err(VoiceError::Config(_))));
    }

    #[test]
    fn mode_out_of_range_is_rejected() {
        let config = VadConfig {
            mode: 7,
            ..Default::default()
        };
        assert!(VoiceActivityDetector::new(config).is_err());
    }

    #[test]
    fn wrong_frame_length_is_an_error() {
        let mut detector = VoiceActivityDetector::new(VadConfig::default()).unwrap();
        assert!(detector.is_speech(&[0.0; 100]).is_err());
    }

    #[test]
    fn silence_is_not_speech() {
        let mut detector = VoiceActivityDetector::new(VadConfig::default()).unwrap();
        assert!(!detector.is_speech(&[0.0; 480]).unwrap());
    }
}
