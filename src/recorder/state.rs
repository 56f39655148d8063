//! Recording state management
//!
//! Defines the recording state machine and the session time accounting.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Sample gap after which a running session counts as paused (10 seconds)
pub const PAUSE_TIME_MS: i64 = 10_000;

/// Current state of a workout recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// Created, not started yet
    Idle,
    /// Currently recording
    Running,
    /// Recording is paused
    Paused,
    /// Recording finished; terminal
    Stopped,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RecordingState {
    /// Whether the recorder still reacts to sensors and the watchdog
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Running | Self::Paused)
    }
}

/// Which kind of sensor data a recorder turns into samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingType {
    Gps,
    Indoor,
}

/// One entry of an interval plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub id: i64,
    /// Time until the following interval in milliseconds
    pub delay_millis: i64,
}

impl Interval {
    pub fn new(id: i64, delay_millis: i64) -> Self {
        Self { id, delay_millis }
    }
}

/// Behaviour switches of a recorder, derived from user preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Pause/resume automatically on sample gaps
    pub use_auto_pause: bool,
    /// Stop automatically after this much inactivity; zero disables it
    pub auto_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            use_auto_pause: true,
            auto_timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl RecorderConfig {
    pub fn auto_timeout_ms(&self) -> i64 {
        self.auto_timeout.as_millis() as i64
    }

    /// Whether a sample may be recorded in the given state
    pub fn accepts_samples(&self, state: RecordingState) -> bool {
        if self.use_auto_pause {
            matches!(state, RecordingState::Running | RecordingState::Paused)
        } else {
            state == RecordingState::Running
        }
    }
}

/// The in-progress workout: lifecycle state plus time accumulators.
///
/// Active and pause time are folded into the accumulators on every
/// transition; the live part is added on query, so no timer thread is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub state: RecordingState,
    /// Clock time of the first start; `None` while idle
    pub start_ms: Option<i64>,
    /// Active time folded in up to the last pause
    pub active_ms: i64,
    /// Pause time folded in up to the last resume
    pub pause_ms: i64,
    /// Clock time of the last start or resume
    pub last_resume_ms: i64,
    /// Clock time of the last pause, if any
    pub last_pause_ms: Option<i64>,
    /// Clock time of the last recorded sample
    pub last_sample_ms: i64,
    /// Planned intervals, in order
    pub interval_plan: Vec<Interval>,
    /// Interval triggered since the last sample; moved onto the next one
    pub last_triggered_interval: Option<i64>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecordingState::Idle,
            start_ms: None,
            active_ms: 0,
            pause_ms: 0,
            last_resume_ms: 0,
            last_pause_ms: None,
            last_sample_ms: 0,
            interval_plan: Vec::new(),
            last_triggered_interval: None,
        }
    }

    pub(crate) fn begin(&mut self, now_ms: i64) {
        self.start_ms = Some(now_ms);
    }

    /// Enter `Running`, folding a preceding pause into the pause accumulator
    pub(crate) fn resume(&mut self, now_ms: i64) {
        self.state = RecordingState::Running;
        self.last_resume_ms = now_ms;
        if let Some(last_pause) = self.last_pause_ms {
            self.pause_ms += now_ms - last_pause;
        }
    }

    /// Enter `Paused`; only effective while running
    pub(crate) fn pause(&mut self, now_ms: i64) -> bool {
        if self.state != RecordingState::Running {
            return false;
        }
        self.state = RecordingState::Paused;
        self.active_ms += now_ms - self.last_resume_ms;
        self.last_pause_ms = Some(now_ms);
        true
    }

    /// Flush both accumulators and enter the terminal state
    pub(crate) fn stop(&mut self, now_ms: i64) {
        if self.state == RecordingState::Paused {
            self.resume(now_ms);
        }
        self.pause(now_ms);
        self.state = RecordingState::Stopped;
    }

    /// Active time in milliseconds
    pub fn duration_ms(&self, now_ms: i64) -> i64 {
        if self.state == RecordingState::Running {
            self.active_ms + (now_ms - self.last_resume_ms)
        } else {
            self.active_ms
        }
    }

    /// Pause time in milliseconds
    pub fn pause_duration_ms(&self, now_ms: i64) -> i64 {
        match (self.state, self.last_pause_ms) {
            (RecordingState::Paused, Some(last_pause)) => self.pause_ms + (now_ms - last_pause),
            _ => self.pause_ms,
        }
    }

    /// Wall-clock time since start, pauses included
    pub fn time_since_start_ms(&self, now_ms: i64) -> i64 {
        self.start_ms.map(|start| now_ms - start).unwrap_or(0)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(at: i64) -> Session {
        let mut session = Session::new();
        session.begin(at);
        session.resume(at);
        session
    }

    #[test]
    fn test_active_and_pause_partition_wall_clock() {
        let mut session = started(1_000);
        session.pause(4_000);
        session.resume(6_500);
        session.pause(7_000);

        for now in [7_000, 8_000, 12_345] {
            let total = session.duration_ms(now) + session.pause_duration_ms(now);
            assert_eq!(total, session.time_since_start_ms(now));
        }
        assert_eq!(session.duration_ms(9_000), 3_500);
        assert_eq!(session.pause_duration_ms(9_000), 4_500);
    }

    #[test]
    fn test_pause_is_noop_when_not_running() {
        let mut session = started(0);
        assert!(session.pause(1_000));
        let before = session.clone();
        assert!(!session.pause(2_000));
        assert_eq!(session, before);
    }

    #[test]
    fn test_stop_from_paused_folds_pause() {
        let mut session = started(0);
        session.pause(2_000);
        session.stop(5_000);
        assert_eq!(session.state, RecordingState::Stopped);
        assert_eq!(session.duration_ms(9_000), 2_000);
        assert_eq!(session.pause_duration_ms(9_000), 3_000);
    }

    #[test]
    fn test_acceptance_policy_follows_auto_pause() {
        let auto = RecorderConfig::default();
        assert!(auto.accepts_samples(RecordingState::Paused));
        assert!(!auto.accepts_samples(RecordingState::Idle));

        let manual = RecorderConfig {
            use_auto_pause: false,
            ..RecorderConfig::default()
        };
        assert!(manual.accepts_samples(RecordingState::Running));
        assert!(!manual.accepts_samples(RecordingState::Paused));
    }
}
