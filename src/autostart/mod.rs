//! Auto-start of a workout
//!
//! A countdown, optionally followed by waiting for a good GPS fix or for
//! the user to move, after which the recorder is asked to start.

pub mod movement;
pub mod sequencer;

pub use movement::{DefaultMovementDetector, MovementDetector};
pub use sequencer::AutoStartSequencer;

use serde::{Deserialize, Serialize};

/// Default countdown in seconds
pub const DEFAULT_DELAY_S: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoStartState {
    Idle,
    Countdown,
    WaitingForGps,
    WaitingForMove,
    AutoStartRequested,
    AbortedByUser,
    AbortedAlreadyStarted,
}

impl Default for AutoStartState {
    fn default() -> Self {
        Self::Idle
    }
}

/// What to wait for once the countdown ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoStartMode {
    Instant,
    OnMove,
    WaitForGps,
}

impl Default for AutoStartMode {
    fn default() -> Self {
        Self::Instant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoStartConfig {
    pub countdown_ms: i64,
    pub mode: AutoStartMode,
}

impl AutoStartConfig {
    pub fn new(countdown_ms: i64, mode: AutoStartMode) -> Self {
        Self { countdown_ms, mode }
    }

    pub fn with_countdown(countdown_ms: i64) -> Self {
        Self::new(countdown_ms, AutoStartMode::default())
    }

    pub fn with_mode(mode: AutoStartMode) -> Self {
        Self::new(DEFAULT_DELAY_S * 1_000, mode)
    }
}

impl Default for AutoStartConfig {
    fn default() -> Self {
        Self::with_mode(AutoStartMode::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbortReason {
    /// The user cancelled the countdown
    UserReq,
    /// The workout was started by other means
    Started,
}
