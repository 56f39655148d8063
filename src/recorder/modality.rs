//! Recording modalities
//!
//! A modality decides what a sample looks like and how sensor events turn
//! into samples. The state machine in [`super::WorkoutRecorder`] is shared.

use super::state::{RecordingState, RecordingType, Session};
use crate::events::{SensorEvent, WorkoutEvent};
use crate::store::WorkoutSamples;
use std::fmt;

/// Outcome of offering a sensor event to a modality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Not relevant, or filtered out
    Ignored,
    /// Counts as sensor activity but produced no sample
    Observed,
    /// A sample was appended or extended
    Recorded,
}

impl Ingest {
    /// Whether the recorder should refresh its last-sample timestamp
    pub fn is_activity(&self) -> bool {
        !matches!(self, Ingest::Ignored)
    }
}

/// Session facts a modality needs while ingesting
pub struct IngestContext<'a> {
    pub now_ms: i64,
    pub state: RecordingState,
    /// Result of the auto-pause aware acceptance policy
    pub accepting: bool,
    pub start_ms: i64,
    pub pause_duration_ms: i64,
    pub heart_rate: Option<u32>,
    pending_interval: &'a mut Option<i64>,
}

impl<'a> IngestContext<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        now_ms: i64,
        accepting: bool,
        heart_rate: Option<u32>,
    ) -> Self {
        let state = session.state;
        let start_ms = session.start_ms.unwrap_or(0);
        let pause_duration_ms = session.pause_duration_ms(now_ms);
        Self {
            now_ms,
            state,
            accepting,
            start_ms,
            pause_duration_ms,
            heart_rate,
            pending_interval: &mut session.last_triggered_interval,
        }
    }

    /// Relative (active) time of an observation taken at `timestamp_ms`
    pub fn relative_time(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - self.start_ms - self.pause_duration_ms
    }

    /// Claim the pending interval id for a new sample
    pub fn take_pending_interval(&mut self) -> Option<i64> {
        self.pending_interval.take()
    }
}

/// Timing fields every persisted sample carries
pub trait TimedSample {
    /// Unix milliseconds of the observation
    fn absolute_time(&self) -> i64;
    /// Active workout time at the observation
    fn relative_time(&self) -> i64;
}

/// Modality-specific hooks of a workout recorder
pub trait Modality: Send + 'static {
    type Sample: TimedSample + Clone + fmt::Debug + Send + Sync;

    fn recording_type(&self) -> RecordingType;

    /// Called once when the session leaves `Idle`
    fn on_start(&mut self, _now_ms: i64) {}

    /// Called once when the session stops
    fn on_stop(&mut self, _session: &Session, _now_ms: i64) {}

    /// Periodic upkeep; may return an event to publish
    fn on_watchdog(&mut self, _now_ms: i64) -> Option<WorkoutEvent> {
        None
    }

    fn auto_pause_possible(&self) -> bool;

    fn samples(&self) -> &[Self::Sample];

    fn sample_size(&self) -> usize {
        self.samples().len()
    }

    fn ingest(&mut self, event: &SensorEvent, ctx: &mut IngestContext<'_>) -> Ingest;

    /// Samples in their persisted form
    fn snapshot(&self) -> WorkoutSamples;
}
