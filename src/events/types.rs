//! Event definitions
//!
//! Sensor events flow into the core; workout events flow out of it.

use crate::autostart::AutoStartState;
use crate::recorder::gps::GpsState;
use crate::recorder::RecordingState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection state of a Bluetooth heart-rate strap (or its battery service)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ConnectionFailed,
}

/// Movement classification reported by a movement detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectionState {
    /// Detector is still initializing or cannot tell
    NotSure,
    Moving,
    NotMoving,
}

/// A single position fix from the location provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Speed in m/s
    pub speed: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    /// Fix time in Unix milliseconds
    pub timestamp_ms: i64,
}

/// Typed events delivered by the sensor adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SensorEvent {
    HeartRate { bpm: u32, timestamp_ms: i64 },
    HeartRateConnection { state: ConnectionState },
    HrBatteryLevel { level: u8 },
    HrBatteryConnection { state: ConnectionState },
    Location { fix: GpsFix },
    /// Signal quality as judged by the location provider
    GpsQuality { state: GpsState },
    /// Barometric pressure in hPa
    Pressure { hpa: f32, timestamp_ms: i64 },
    Movement { state: DetectionState },
    Repetition { timestamp_ms: i64, intensity: f64 },
}

/// Auto-start countdown value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownTick {
    pub countdown_ms: i64,
    /// Remaining seconds, rounded to the nearest second
    pub countdown_s: i64,
}

impl CountdownTick {
    pub fn new(countdown_ms: i64) -> Self {
        Self {
            countdown_ms,
            countdown_s: (countdown_ms + 500) / 1000,
        }
    }
}

/// Lifecycle events emitted by the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkoutEvent {
    RecordingStateChanged {
        old: RecordingState,
        new: RecordingState,
    },
    /// The watchdog stopped and saved the workout after sample inactivity
    AutoStop { workout_id: Uuid },
    GpsStateChanged { old: GpsState, new: GpsState },
    CountdownChanged(CountdownTick),
    AutoStartStateChanged {
        old: AutoStartState,
        new: AutoStartState,
    },
    IntervalTriggered { interval_id: i64 },
    /// A fire-and-forget save or discard failed
    PersistenceFailed { workout_id: Uuid, message: String },
}
