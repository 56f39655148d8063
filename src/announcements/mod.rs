//! Announcement and feedback triggers
//!
//! Decides *when* a spoken, acoustic or tactile cue fires. What the cue
//! sounds or feels like is up to the [`CueSink`] implementation.

pub mod countdown;
pub mod feedback;
pub mod interval;

pub use countdown::CountdownAnnouncements;
pub use feedback::AutoStartCues;
pub use interval::IntervalAnnouncements;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Something to be spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Announcement {
    /// Bare number, used for the last ten seconds
    CountdownShort { seconds: i64 },
    CountdownSeconds { seconds: i64 },
    CountdownMinutes { minutes: i64 },
    CountdownMinutesSeconds { minutes: i64, seconds: i64 },
    WaitingForGps,
    WaitingForMove,
    AutoStartAborted,
    Interval { interval_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tone {
    CountdownBeep,
    StartSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Cue {
    Speak(Announcement),
    Tone { tone: Tone, duration: Duration },
    Vibrate { duration: Duration },
}

/// Renders cues (text-to-speech, tone generator, vibrator, ...)
pub trait CueSink: Send + Sync {
    fn emit(&self, cue: Cue);
}

/// Sink that keeps every cue in memory
#[derive(Debug, Default)]
pub struct CueBuffer {
    cues: Mutex<Vec<Cue>>,
}

impl CueBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the buffered cues
    pub fn take(&self) -> Vec<Cue> {
        std::mem::take(&mut *self.cues.lock())
    }
}

impl CueSink for CueBuffer {
    fn emit(&self, cue: Cue) {
        tracing::debug!(?cue, "cue");
        self.cues.lock().push(cue);
    }
}
