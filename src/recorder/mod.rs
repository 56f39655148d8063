//! Workout recording module
//!
//! This module implements the recording state machine:
//! - Session time accounting and the Idle/Running/Paused/Stopped lifecycle
//! - Modality trait with GPS and indoor implementations
//! - WorkoutRecorder tying both to the event bus and the store
//! - A per-recorder store writer for checkpoints, saves and discards

pub mod gps;
pub mod indoor;
pub mod modality;
mod persistence;
pub mod state;
pub mod workout_recorder;

pub use gps::{GpsModality, GpsParams, GpsSample, GpsState};
pub use indoor::{IndoorModality, IndoorSample};
pub use modality::{Ingest, IngestContext, Modality, TimedSample};
pub use state::{Interval, RecorderConfig, RecordingState, RecordingType, Session, PAUSE_TIME_MS};
pub use workout_recorder::{GpsRecorder, IndoorRecorder, Recorder, RecorderEnv, WorkoutRecorder};
