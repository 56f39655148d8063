//! Workout recorder
//!
//! One state machine shared by every modality. All mutation happens under a
//! single mutex; events are published while it is held so subscribers see
//! transitions in order. Persistence is queued after the lock is released.
//! Unfinished workouts are checkpointed on start and on every watchdog tick
//! that saw new samples, so they can be restored after a crash.

use super::gps::{GpsModality, GpsParams, GpsState};
use super::indoor::IndoorModality;
use super::modality::{IngestContext, Modality, TimedSample};
use super::persistence::{StoreOp, StoreWriter};
use super::state::{
    Interval, RecorderConfig, RecordingState, RecordingType, Session, PAUSE_TIME_MS,
};
use crate::events::{ConnectionState, EventBus, SensorEvent, WorkoutEvent};
use crate::store::{WorkoutRecord, WorkoutSamples, WorkoutStore, WorkoutSummary};
use crate::utils::{Clock, RecorderError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Object-safe recorder surface used by the watchdog, the announcements
/// and the application context.
pub trait Recorder: Send + Sync {
    fn id(&self) -> Uuid;
    fn recording_type(&self) -> RecordingType;
    fn state(&self) -> RecordingState;

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Start from `Idle`, or resume from `Paused`
    fn start(&self, reason: &str) -> Result<(), RecorderError>;
    fn resume(&self) -> Result<(), RecorderError>;
    fn pause(&self);
    fn stop(&self, reason: &str);

    /// Hand the stopped workout to the store without waiting for it
    fn save(&self) -> Result<(), RecorderError>;
    fn is_saved(&self) -> bool;
    fn discard(&self) -> Result<(), RecorderError>;

    fn duration_ms(&self) -> i64;
    fn pause_duration_ms(&self) -> i64;
    fn time_since_start_ms(&self) -> i64;

    fn sample_count(&self) -> usize;

    fn has_recorded_something(&self) -> bool {
        self.sample_count() > 2
    }

    fn current_heart_rate(&self) -> Option<u32>;
    fn current_hr_battery_level(&self) -> Option<u8>;
    fn is_auto_pause_enabled(&self) -> bool;

    fn on_sensor_event(&self, event: &SensorEvent);
    /// Remember an interval id for the next recorded sample
    fn on_interval_triggered(&self, interval_id: i64);
    fn set_interval_list(&self, intervals: Vec<Interval>);
    fn interval_list(&self) -> Vec<Interval>;
    fn set_comment(&self, comment: String);
    fn set_used_interval_set(&self, interval_set_id: i64);

    /// One supervision step. Returns whether the recorder is still active.
    fn handle_watchdog(&self) -> Result<bool, RecorderError>;

    /// Current workout as a persistable record
    fn record(&self) -> WorkoutRecord;
}

/// Collaborators every recorder is wired to
#[derive(Clone)]
pub struct RecorderEnv {
    pub config: RecorderConfig,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub store: Arc<dyn WorkoutStore>,
}

struct Inner<M> {
    session: Session,
    modality: M,
    workout_type: String,
    comment: String,
    interval_set_id: Option<i64>,
    end_ms: Option<i64>,
    heart_rate: Option<u32>,
    hr_battery: Option<u8>,
    /// Set on stop; sensor events are ignored afterwards
    detached: bool,
    /// Set on discard; no more checkpoints are written
    discarded: bool,
    /// Sample count of the last checkpoint
    checkpointed_samples: usize,
    /// Sequence number of the last queued store operation
    store_seq: u64,
}

impl<M> Inner<M> {
    fn next_store_seq(&mut self) -> u64 {
        self.store_seq += 1;
        self.store_seq
    }
}

pub struct WorkoutRecorder<M: Modality> {
    inner: Mutex<Inner<M>>,
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    writer: StoreWriter,
    saved: Arc<AtomicBool>,
}

pub type GpsRecorder = WorkoutRecorder<GpsModality>;
pub type IndoorRecorder = WorkoutRecorder<IndoorModality>;

impl<M: Modality> WorkoutRecorder<M> {
    pub fn new(modality: M, workout_type: impl Into<String>, env: RecorderEnv) -> Self {
        let session = Session::new();
        tracing::info!(
            "Creating {:?} workout recorder {}",
            modality.recording_type(),
            session.id
        );
        Self::from_parts(session, modality, workout_type.into(), env)
    }

    fn from_parts(session: Session, modality: M, workout_type: String, env: RecorderEnv) -> Self {
        let saved = Arc::new(AtomicBool::new(false));
        Self {
            inner: Mutex::new(Inner {
                session,
                modality,
                workout_type,
                comment: String::new(),
                interval_set_id: None,
                end_ms: None,
                heart_rate: None,
                hr_battery: None,
                detached: false,
                discarded: false,
                checkpointed_samples: 0,
                store_seq: 0,
            }),
            config: env.config,
            clock: env.clock,
            writer: StoreWriter::new(env.store, env.events.clone(), saved.clone()),
            events: env.events,
            saved,
        }
    }

    /// Rebuild a recorder for a workout that was interrupted.
    ///
    /// `modality` must already hold the persisted samples. Active and pause
    /// time are reproduced as they were at the last sample; finished
    /// workouts come back stopped with their stored totals.
    pub fn restore(modality: M, summary: WorkoutSummary, env: RecorderEnv) -> Self {
        let now = env.clock.now_ms();
        let mut session = Session::new();
        session.id = summary.id;
        session.start_ms = Some(summary.start_ms);

        if summary.is_finished() {
            session.state = RecordingState::Stopped;
            session.active_ms = summary.duration_ms;
            session.pause_ms = summary.pause_duration_ms;
        } else {
            tracing::info!(
                "Reconstructing workout {} from {} samples",
                summary.id,
                modality.sample_size()
            );
            let (last_time, active) = modality
                .samples()
                .last()
                .map(|s| (s.absolute_time(), s.relative_time()))
                .unwrap_or((summary.start_ms, 0));

            session.active_ms = active;
            session.pause_ms = last_time - summary.start_ms - active;
            if now - last_time > PAUSE_TIME_MS {
                session.state = RecordingState::Paused;
                session.active_ms += PAUSE_TIME_MS;
                session.last_pause_ms = Some(last_time + PAUSE_TIME_MS);
            } else {
                session.state = RecordingState::Running;
                session.last_resume_ms = last_time;
            }
            // a restored workout must not time out right away
            session.last_sample_ms = now;
        }

        let finished = summary.is_finished();
        let recorder = Self::from_parts(session, modality, summary.workout_type, env);
        {
            let mut inner = recorder.inner.lock();
            inner.comment = summary.comment;
            inner.interval_set_id = summary.interval_set_id;
            inner.end_ms = summary.end_ms;
            inner.detached = finished;
            inner.checkpointed_samples = inner.modality.sample_size();
        }
        recorder
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn workout_type(&self) -> String {
        self.inner.lock().workout_type.clone()
    }

    /// Run `f` against the modality, e.g. to read derived metrics
    pub fn with_modality<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.inner.lock().modality)
    }

    fn transition(&self, session: &mut Session, f: impl FnOnce(&mut Session)) {
        let old = session.state;
        f(session);
        let new = session.state;
        if old != new {
            tracing::info!("Recording state: {:?} -> {:?}", old, new);
            self.events
                .publish(WorkoutEvent::RecordingStateChanged { old, new });
        }
    }

    fn stop_locked(&self, inner: &mut Inner<M>, reason: &str, now: i64) {
        if inner.session.state == RecordingState::Stopped {
            tracing::debug!("Ignoring stop ({}), already stopped", reason);
            return;
        }
        tracing::info!("Stopping workout, reason: {}", reason);
        self.transition(&mut inner.session, |s| s.stop(now));
        inner.modality.on_stop(&inner.session, now);
        inner.end_ms = Some(now);
        inner.detached = true;
    }

    fn build_record(&self, inner: &Inner<M>, now: i64) -> WorkoutRecord {
        let session = &inner.session;
        WorkoutRecord {
            summary: WorkoutSummary {
                id: session.id,
                recording_type: inner.modality.recording_type(),
                workout_type: inner.workout_type.clone(),
                state: session.state,
                start_ms: session.start_ms.unwrap_or(0),
                end_ms: inner.end_ms,
                duration_ms: session.duration_ms(now),
                pause_duration_ms: session.pause_duration_ms(now),
                comment: inner.comment.clone(),
                interval_set_id: inner.interval_set_id,
            },
            samples: inner.modality.snapshot(),
        }
    }

    /// Snapshot for a checkpoint, if forced or samples were added since the last one
    fn take_checkpoint(
        &self,
        inner: &mut Inner<M>,
        now: i64,
        force: bool,
    ) -> Option<(u64, WorkoutRecord)> {
        let size = inner.modality.sample_size();
        if inner.discarded || (!force && size == inner.checkpointed_samples) {
            return None;
        }
        inner.checkpointed_samples = size;
        Some((inner.next_store_seq(), self.build_record(inner, now)))
    }

    fn checkpoint(&self, seq: u64, record: WorkoutRecord) {
        let id = record.id();
        if let Err(e) = self.writer.submit(seq, StoreOp::Checkpoint(record)) {
            tracing::debug!("Skipping checkpoint of workout {}: {}", id, e);
        }
    }

    fn persist(&self, seq: u64, record: WorkoutRecord) -> Result<(), RecorderError> {
        self.saved.store(true, Ordering::SeqCst);
        let result = self.writer.submit(seq, StoreOp::Save(record));
        if result.is_err() {
            self.saved.store(false, Ordering::SeqCst);
        }
        result
    }
}

impl<M: Modality> Recorder for WorkoutRecorder<M> {
    fn id(&self) -> Uuid {
        self.inner.lock().session.id
    }

    fn recording_type(&self) -> RecordingType {
        self.inner.lock().modality.recording_type()
    }

    fn state(&self) -> RecordingState {
        self.inner.lock().session.state
    }

    fn start(&self, reason: &str) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        tracing::info!("Called start, reason: {}", reason);
        match inner.session.state {
            RecordingState::Idle => {
                inner.session.begin(now);
                inner.modality.on_start(now);
                self.transition(&mut inner.session, |s| s.resume(now));
                let checkpoint = self.take_checkpoint(&mut inner, now, true);
                drop(inner);
                if let Some((seq, record)) = checkpoint {
                    self.checkpoint(seq, record);
                }
                Ok(())
            }
            RecordingState::Paused => {
                self.transition(&mut inner.session, |s| s.resume(now));
                Ok(())
            }
            RecordingState::Running => Ok(()),
            state => Err(RecorderError::invalid("start", state)),
        }
    }

    fn resume(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        match inner.session.state {
            RecordingState::Paused => {
                self.transition(&mut inner.session, |s| s.resume(now));
                Ok(())
            }
            RecordingState::Running => Ok(()),
            state => Err(RecorderError::invalid("resume", state)),
        }
    }

    fn pause(&self) {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        self.transition(&mut inner.session, |s| {
            s.pause(now);
        });
    }

    fn stop(&self, reason: &str) {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        self.stop_locked(&mut inner, reason, now);
    }

    fn save(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        let state = inner.session.state;
        if state != RecordingState::Stopped {
            return Err(RecorderError::invalid("save", state));
        }
        let record = self.build_record(&inner, self.clock.now_ms());
        let seq = inner.next_store_seq();
        drop(inner);
        self.persist(seq, record)
    }

    fn is_saved(&self) -> bool {
        self.saved.load(Ordering::SeqCst)
    }

    fn discard(&self) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        let id = inner.session.id;
        inner.discarded = true;
        let seq = inner.next_store_seq();
        drop(inner);
        tracing::info!("Discarding workout {}", id);
        self.writer.submit(seq, StoreOp::Discard(id))
    }

    fn duration_ms(&self) -> i64 {
        self.inner.lock().session.duration_ms(self.clock.now_ms())
    }

    fn pause_duration_ms(&self) -> i64 {
        self.inner.lock().session.pause_duration_ms(self.clock.now_ms())
    }

    fn time_since_start_ms(&self) -> i64 {
        self.inner.lock().session.time_since_start_ms(self.clock.now_ms())
    }

    fn sample_count(&self) -> usize {
        self.inner.lock().modality.sample_size()
    }

    fn current_heart_rate(&self) -> Option<u32> {
        self.inner.lock().heart_rate
    }

    fn current_hr_battery_level(&self) -> Option<u8> {
        self.inner.lock().hr_battery
    }

    fn is_auto_pause_enabled(&self) -> bool {
        self.config.use_auto_pause
    }

    fn on_sensor_event(&self, event: &SensorEvent) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.detached {
            return;
        }

        match *event {
            SensorEvent::HeartRate { bpm, .. } => inner.heart_rate = Some(bpm),
            SensorEvent::HeartRateConnection { state } if state != ConnectionState::Connected => {
                inner.heart_rate = None;
            }
            SensorEvent::HrBatteryLevel { level } => inner.hr_battery = Some(level),
            SensorEvent::HrBatteryConnection { state } if state != ConnectionState::Connected => {
                inner.hr_battery = None;
            }
            _ => {}
        }

        let now = self.clock.now_ms();
        let accepting = self.config.accepts_samples(inner.session.state);
        let mut ctx = IngestContext::new(&mut inner.session, now, accepting, inner.heart_rate);
        let outcome = inner.modality.ingest(event, &mut ctx);
        if outcome.is_activity() {
            inner.session.last_sample_ms = now;
        }
    }

    fn on_interval_triggered(&self, interval_id: i64) {
        self.inner.lock().session.last_triggered_interval = Some(interval_id);
    }

    fn set_interval_list(&self, intervals: Vec<Interval>) {
        self.inner.lock().session.interval_plan = intervals;
    }

    fn interval_list(&self) -> Vec<Interval> {
        self.inner.lock().session.interval_plan.clone()
    }

    fn set_comment(&self, comment: String) {
        self.inner.lock().comment = comment;
    }

    fn set_used_interval_set(&self, interval_set_id: i64) {
        self.inner.lock().interval_set_id = Some(interval_set_id);
    }

    fn handle_watchdog(&self) -> Result<bool, RecorderError> {
        let mut inner = self.inner.lock();
        if !inner.session.state.is_active() {
            return Ok(false);
        }
        let now = self.clock.now_ms();
        tracing::debug!(
            "handleWatchdog {:?} samples: {}",
            inner.session.state,
            inner.modality.sample_size()
        );

        if let Some(event) = inner.modality.on_watchdog(now) {
            self.events.publish(event);
        }

        if inner.modality.sample_size() > 2 {
            let time_diff = now - inner.session.last_sample_ms;
            let auto_timeout = self.config.auto_timeout_ms();
            if auto_timeout > 0 && time_diff > auto_timeout {
                tracing::info!("Auto timeout was set to: {}ms", auto_timeout);
                let reason = format!("Auto timeout, timediff: {}", time_diff);
                self.stop_locked(&mut inner, &reason, now);
                let record = self.build_record(&inner, now);
                let seq = inner.next_store_seq();
                let id = inner.session.id;
                drop(inner);

                let saved = self.persist(seq, record);
                self.events.publish(WorkoutEvent::AutoStop { workout_id: id });
                return saved.map(|_| true);
            }

            if self.config.use_auto_pause {
                if time_diff > PAUSE_TIME_MS {
                    if inner.session.state == RecordingState::Running
                        && inner.modality.auto_pause_possible()
                    {
                        self.transition(&mut inner.session, |s| {
                            s.pause(now);
                        });
                    }
                } else if inner.session.state == RecordingState::Paused {
                    self.transition(&mut inner.session, |s| s.resume(now));
                }
            }
        }

        let checkpoint = if inner.session.state == RecordingState::Idle {
            None
        } else {
            self.take_checkpoint(&mut inner, now, false)
        };
        drop(inner);
        if let Some((seq, record)) = checkpoint {
            self.checkpoint(seq, record);
        }
        Ok(true)
    }

    fn record(&self) -> WorkoutRecord {
        let inner = self.inner.lock();
        self.build_record(&inner, self.clock.now_ms())
    }
}

impl WorkoutRecorder<GpsModality> {
    /// Restore a GPS workout from its persisted record
    pub fn restore_gps(
        record: WorkoutRecord,
        params: GpsParams,
        env: RecorderEnv,
    ) -> Result<Self, RecorderError> {
        match record.samples {
            WorkoutSamples::Gps(samples) => Ok(Self::restore(
                GpsModality::with_samples(params, samples),
                record.summary,
                env,
            )),
            other => Err(RecorderError::TypeMismatch {
                expected: RecordingType::Gps,
                found: other.recording_type(),
            }),
        }
    }

    pub fn gps_state(&self) -> GpsState {
        self.with_modality(|gps| gps.gps_state())
    }

    pub fn distance_m(&self) -> f64 {
        self.with_modality(|gps| gps.distance_m())
    }

    pub fn avg_speed(&self) -> f64 {
        let duration = self.duration_ms();
        self.with_modality(|gps| gps.avg_speed(duration))
    }

    pub fn avg_pace(&self) -> f64 {
        let duration = self.duration_ms();
        self.with_modality(|gps| gps.avg_pace(duration))
    }

    pub fn current_speed(&self) -> f64 {
        let inner = self.inner.lock();
        let duration = inner.session.duration_ms(self.clock.now_ms());
        inner
            .modality
            .current_speed(duration, inner.session.last_resume_ms)
    }

    pub fn ascent_m(&self) -> f64 {
        self.with_modality(|gps| gps.ascent_m())
    }
}

impl WorkoutRecorder<IndoorModality> {
    /// Restore an indoor workout from its persisted record
    pub fn restore_indoor(
        record: WorkoutRecord,
        min_repetitions: u32,
        env: RecorderEnv,
    ) -> Result<Self, RecorderError> {
        match record.samples {
            WorkoutSamples::Indoor(samples) => Ok(Self::restore(
                IndoorModality::with_samples(min_repetitions, samples),
                record.summary,
                env,
            )),
            other => Err(RecorderError::TypeMismatch {
                expected: RecordingType::Indoor,
                found: other.recording_type(),
            }),
        }
    }

    pub fn repetitions_total(&self) -> u64 {
        self.with_modality(|indoor| indoor.repetitions_total())
    }

    pub fn average_frequency(&self) -> f64 {
        let duration = self.duration_ms();
        self.with_modality(|indoor| indoor.average_frequency(duration))
    }

    pub fn current_frequency(&self) -> f64 {
        self.with_modality(|indoor| indoor.current_frequency())
    }

    pub fn current_intensity(&self) -> f64 {
        self.with_modality(|indoor| indoor.current_intensity())
    }
}
