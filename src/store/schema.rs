//! Persisted workout record
//!
//! The shape handed to persistence collaborators when a workout is saved.

use crate::recorder::gps::GpsSample;
use crate::recorder::indoor::IndoorSample;
use crate::recorder::{RecordingState, RecordingType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workout-level facts of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSummary {
    pub id: Uuid,
    pub recording_type: RecordingType,
    /// Free-form workout type id, e.g. "running" or "treadmill"
    pub workout_type: String,
    /// Lifecycle state at the time of writing
    pub state: RecordingState,
    /// Clock time of the first start
    pub start_ms: i64,
    /// Set once the recording stopped
    pub end_ms: Option<i64>,
    /// Active time, pauses excluded
    pub duration_ms: i64,
    /// Total time spent paused
    pub pause_duration_ms: i64,
    #[serde(default)]
    pub comment: String,
    /// Interval set the workout was recorded with, if any
    pub interval_set_id: Option<i64>,
}

impl WorkoutSummary {
    pub fn is_finished(&self) -> bool {
        self.end_ms.is_some()
    }
}

/// Samples of a recording, by modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "samples", rename_all = "lowercase")]
pub enum WorkoutSamples {
    Gps(Vec<GpsSample>),
    Indoor(Vec<IndoorSample>),
}

impl WorkoutSamples {
    pub fn recording_type(&self) -> RecordingType {
        match self {
            WorkoutSamples::Gps(_) => RecordingType::Gps,
            WorkoutSamples::Indoor(_) => RecordingType::Indoor,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WorkoutSamples::Gps(samples) => samples.len(),
            WorkoutSamples::Indoor(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A workout together with its samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRecord {
    pub summary: WorkoutSummary,
    /// Every recorded sample, oldest first
    pub samples: WorkoutSamples,
}

impl WorkoutRecord {
    pub fn id(&self) -> Uuid {
        self.summary.id
    }
}
