//! Indoor recording modality
//!
//! Records repetitions (steps, jumps, push-ups, ...) reported by an exercise
//! recognizer. Consecutive repetitions are folded into one sample until it
//! holds the workout type's minimum count.

use super::modality::{Ingest, IngestContext, Modality, TimedSample};
use super::state::{RecordingType, PAUSE_TIME_MS};
use crate::events::SensorEvent;
use crate::store::WorkoutSamples;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndoorSample {
    pub absolute_time: i64,
    pub absolute_end_time: i64,
    pub relative_time: i64,
    pub repetitions: u32,
    /// Mean intensity of the folded repetitions
    pub intensity: f64,
    pub heart_rate: Option<u32>,
    pub interval_triggered: Option<i64>,
}

impl TimedSample for IndoorSample {
    fn absolute_time(&self) -> i64 {
        self.absolute_time
    }

    fn relative_time(&self) -> i64 {
        self.relative_time
    }
}

#[derive(Debug)]
pub struct IndoorModality {
    min_repetitions: u32,
    samples: Vec<IndoorSample>,
    repetitions: u64,
}

impl IndoorModality {
    pub fn new(min_repetitions: u32) -> Self {
        Self {
            min_repetitions,
            samples: Vec::new(),
            repetitions: 0,
        }
    }

    pub fn with_samples(min_repetitions: u32, samples: Vec<IndoorSample>) -> Self {
        let repetitions = samples.iter().map(|s| s.repetitions as u64).sum();
        Self {
            min_repetitions,
            samples,
            repetitions,
        }
    }

    pub fn repetitions_total(&self) -> u64 {
        self.repetitions
    }

    /// Repetitions per second of active time
    pub fn average_frequency(&self, duration_ms: i64) -> f64 {
        self.repetitions as f64 / (duration_ms as f64 / 1000.0).max(1.0)
    }

    /// Repetitions per second across the last completed and the current sample
    pub fn current_frequency(&self) -> f64 {
        let [.., completed, current] = self.samples.as_slice() else {
            return 0.0;
        };
        let repetitions = completed.repetitions + current.repetitions;
        let time_ms = current.absolute_end_time - completed.absolute_time;
        if time_ms <= 0 {
            return 0.0;
        }
        repetitions as f64 / (time_ms as f64 / 1000.0)
    }

    pub fn current_intensity(&self) -> f64 {
        self.samples.last().map(|s| s.intensity).unwrap_or(0.0)
    }

    fn record(&mut self, timestamp_ms: i64, intensity: f64, ctx: &mut IngestContext<'_>) {
        let min_repetitions = self.min_repetitions;
        if let Some(current) = self.samples.last_mut() {
            if current.repetitions < min_repetitions
                && timestamp_ms - current.absolute_time < PAUSE_TIME_MS
            {
                let n = current.repetitions as f64;
                current.intensity = (n * current.intensity + intensity) / (n + 1.0);
                current.absolute_end_time = timestamp_ms;
                current.repetitions += 1;
                return;
            }
        }

        self.samples.push(IndoorSample {
            absolute_time: timestamp_ms,
            absolute_end_time: timestamp_ms,
            relative_time: ctx.relative_time(timestamp_ms),
            repetitions: 1,
            intensity,
            heart_rate: ctx.heart_rate,
            interval_triggered: ctx.take_pending_interval(),
        });
    }
}

impl Modality for IndoorModality {
    type Sample = IndoorSample;

    fn recording_type(&self) -> RecordingType {
        RecordingType::Indoor
    }

    fn auto_pause_possible(&self) -> bool {
        true
    }

    fn samples(&self) -> &[IndoorSample] {
        &self.samples
    }

    fn ingest(&mut self, event: &SensorEvent, ctx: &mut IngestContext<'_>) -> Ingest {
        let SensorEvent::Repetition {
            timestamp_ms,
            intensity,
        } = *event
        else {
            return Ingest::Ignored;
        };

        if !ctx.accepting || timestamp_ms <= ctx.start_ms {
            return Ingest::Observed;
        }
        tracing::debug!("Repetition recognized with intensity {}", intensity);
        self.record(timestamp_ms, intensity, ctx);
        self.repetitions += 1;
        Ingest::Recorded
    }

    fn snapshot(&self) -> WorkoutSamples {
        WorkoutSamples::Indoor(self.samples.clone())
    }
}
