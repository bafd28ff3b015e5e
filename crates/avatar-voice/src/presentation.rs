//! Presentation signals: what a renderer should draw for the current controller state.
//!
//! Everything here is a pure function of time and [`AvatarSignals`]. The mouth does not
//! follow the audio waveform; while speaking it cycles through five vowel visemes at a fixed
//! rate, which reads as speech without any phoneme alignment.

use crate::controller::AvatarSignals;
use std::f32::consts::{PI, TAU};
use std::fmt;
use std::time::{Duration, Instant};

/// Viseme cycle speed, in visemes per second.
pub const MOUTH_CYCLE_RATE: f32 = 8.0;

/// Length of one speaking gesture cycle, in seconds.
pub const GESTURE_CYCLE_SECS: f32 = 6.0;

pub const ORB_PARTICLES: usize = 12;
pub const ORB_RADIUS: f32 = 60.0;
/// Orbit angle advance per rendered frame, in radians.
pub const ORB_STEP: f32 = 0.02;

/// Vowel mouth shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viseme {
    A,
    E,
    I,
    O,
    U,
}

pub const VISEMES: [Viseme; 5] = [Viseme::A, Viseme::E, Viseme::I, Viseme::O, Viseme::U];

impl fmt::Display for Viseme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Viseme::A => "A",
            Viseme::E => "E",
            Viseme::I => "I",
            Viseme::O => "O",
            Viseme::U => "U",
        };
        f.write_str(s)
    }
}

/// `floor((t * MOUTH_CYCLE_RATE) mod 5)`, for `t` in seconds of playback.
pub fn viseme_index(t: f32) -> usize {
    let index = (t * MOUTH_CYCLE_RATE).rem_euclid(VISEMES.len() as f32).floor() as usize;
    index.min(VISEMES.len() - 1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthShape {
    /// `None` when the mouth is closed.
    pub viseme: Option<Viseme>,
    /// Morph weight in [0.0, 0.8].
    pub intensity: f32,
}

impl MouthShape {
    pub const CLOSED: MouthShape = MouthShape {
        viseme: None,
        intensity: 0.0,
    };

    pub fn is_closed(&self) -> bool {
        self.viseme.is_none()
    }
}

/// Mouth at `t` seconds into playback. Closed when not speaking and briefly between
/// syllables.
pub fn mouth_shape(t: f32, speaking: bool) -> MouthShape {
    if !speaking {
        return MouthShape::CLOSED;
    }
    let cycle = t * MOUTH_CYCLE_RATE;
    if (cycle * 0.5).sin() < -0.8 {
        return MouthShape::CLOSED;
    }
    MouthShape {
        viseme: Some(VISEMES[viseme_index(t)]),
        intensity: ((cycle * PI).sin() + 1.0) * 0.5 * 0.8,
    }
}

/// Head rotation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

pub fn head_pose(t: f32, speaking: bool) -> HeadPose {
    if speaking {
        HeadPose {
            pitch: 0.0,
            yaw: (t * 1.5).sin() * 0.15,
            roll: (t * 2.0).sin() * 0.1 * 0.3,
        }
    } else {
        HeadPose {
            pitch: (t * 0.5).sin() * 0.02,
            ..HeadPose::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Rest,
    /// Right arm moves outward; `intensity` in [0, 0.2].
    RightArm { intensity: f32 },
    LeftArm { intensity: f32 },
}

/// Arm gesture for a speaking avatar on a six second cycle.
pub fn gesture(t: f32, speaking: bool) -> Gesture {
    if !speaking {
        return Gesture::Rest;
    }
    let progress = t.rem_euclid(GESTURE_CYCLE_SECS) / GESTURE_CYCLE_SECS;
    if progress < 0.3 {
        Gesture::RightArm {
            intensity: (progress * PI / 0.3).sin() * 0.2,
        }
    } else if progress < 0.6 {
        let sub = (progress - 0.3) / 0.3;
        Gesture::LeftArm {
            intensity: (sub * PI).sin() * 0.2,
        }
    } else {
        Gesture::Rest
    }
}

/// Vertical breathing offset.
pub fn body_bob(t: f32) -> f32 {
    (t * 1.5).sin() * 0.01
}

/// Particle ring around the status orb.
#[derive(Debug, Clone, Default)]
pub struct Orb {
    angle: f32,
}

impl Orb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Particle offsets for this frame, then advance the orbit.
    pub fn advance(&mut self) -> Vec<(f32, f32)> {
        let particles = (0..ORB_PARTICLES)
            .map(|i| {
                let offset = (i as f32 / ORB_PARTICLES as f32) * TAU;
                let a = self.angle + offset;
                (a.cos() * ORB_RADIUS, a.sin() * ORB_RADIUS)
            })
            .collect();
        self.angle += ORB_STEP;
        particles
    }
}

/// Orb styling for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbFrame {
    pub particles: Vec<(f32, f32)>,
    /// Fast pulse while listening.
    pub pulsing: bool,
    /// Gentle bounce while speaking.
    pub bouncing: bool,
    /// Energy meter fill in [0, 1].
    pub energy_fill: f32,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationFrame {
    pub mouth: MouthShape,
    pub head: HeadPose,
    pub gesture: Gesture,
    pub bob: f32,
    /// Sparkle effect around the avatar.
    pub sparkles: bool,
    pub orb: OrbFrame,
}

/// Derives frames from controller signals, remembering when speech began so the mouth
/// cycle starts at the first viseme of each reply.
pub struct Presenter {
    started: Instant,
    speaking_since: Option<Instant>,
    orb: Orb,
}

impl Presenter {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            speaking_since: None,
            orb: Orb::new(),
        }
    }

    pub fn frame(&mut self, signals: &AvatarSignals, now: Instant) -> PresentationFrame {
        let speaking = signals.is_speaking();
        let clock = now.saturating_duration_since(self.started).as_secs_f32();
        let playback = if speaking {
            let since = *self.speaking_since.get_or_insert(now);
            now.saturating_duration_since(since)
        } else {
            self.speaking_since = None;
            Duration::ZERO
        };

        PresentationFrame {
            mouth: mouth_shape(playback.as_secs_f32(), speaking),
            head: head_pose(clock, speaking),
            gesture: gesture(clock, speaking),
            bob: body_bob(clock),
            sparkles: speaking,
            orb: OrbFrame {
                particles: self.orb.advance(),
                pulsing: signals.is_listening(),
                bouncing: speaking,
                energy_fill: signals.energy.fraction(),
            },
        }
    }
}
