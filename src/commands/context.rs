//! Application context
//!
//! Built once at startup and passed to every caller. Owns the event bus,
//! the recorder slot, the watchdog, the auto-start sequencer and the
//! background tasks that connect them.

use crate::announcements::{AutoStartCues, CueBuffer, CueSink, IntervalAnnouncements};
use crate::autostart::{
    AbortReason, AutoStartConfig, AutoStartSequencer, AutoStartState, DefaultMovementDetector,
    MovementDetector,
};
use crate::events::{EventBus, SensorEvent, WorkoutEvent};
use crate::recorder::{
    GpsModality, GpsRecorder, IndoorModality, IndoorRecorder, Interval, Recorder, RecorderEnv,
    RecordingType, WorkoutRecorder,
};
use crate::settings::UserPreferences;
use crate::store::{MemoryStore, WorkoutStore};
use crate::utils::{AppResult, Clock, RecorderError, SystemClock};
use crate::watchdog::{RecorderSlot, Watchdog, WatchdogHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

const SENSOR_QUEUE_CAPACITY: usize = 1_024;

/// Collaborators and settings for [`AppContext::start`]
pub struct ContextOptions {
    pub preferences: UserPreferences,
    pub store: Arc<dyn WorkoutStore>,
    pub cues: Arc<dyn CueSink>,
    pub clock: Arc<dyn Clock>,
    /// Minimum distance used by the movement detector
    pub min_distance_m: f64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            preferences: UserPreferences::default(),
            store: Arc::new(MemoryStore::new()),
            cues: Arc::new(CueBuffer::new()),
            clock: Arc::new(SystemClock),
            min_distance_m: 5.0,
        }
    }
}

pub struct AppContext {
    preferences: UserPreferences,
    clock: Arc<dyn Clock>,
    events: EventBus,
    store: Arc<dyn WorkoutStore>,
    slot: RecorderSlot,
    detector: Arc<dyn MovementDetector>,
    sequencer: AutoStartSequencer,
    intervals: Arc<IntervalAnnouncements>,
    auto_start_cues: Arc<AutoStartCues>,
    sensor_tx: mpsc::Sender<SensorEvent>,
    watchdog: Mutex<Option<WatchdogHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Wire everything up and start the background tasks
    pub async fn start(options: ContextOptions) -> Arc<Self> {
        let ContextOptions {
            preferences,
            store,
            cues,
            clock,
            min_distance_m,
        } = options;

        let events = EventBus::new();
        let slot = RecorderSlot::new();
        let detector: Arc<dyn MovementDetector> =
            Arc::new(DefaultMovementDetector::new(min_distance_m));
        let sequencer = AutoStartSequencer::new(
            preferences.default_auto_start_config(),
            detector.clone(),
            events.clone(),
        );
        let intervals = Arc::new(IntervalAnnouncements::new(
            Vec::new(),
            preferences.intervals_include_pauses,
            cues.clone(),
            events.clone(),
        ));
        let auto_start_cues = Arc::new(AutoStartCues::new(
            cues,
            preferences.auto_start_countdown_announcements,
        ));

        let mut watchdog = Watchdog::new(slot.clone());
        watchdog.add_component(intervals.clone());

        let (sensor_tx, sensor_rx) = mpsc::channel(SENSOR_QUEUE_CAPACITY);

        let context = Arc::new(Self {
            preferences,
            clock,
            events: events.clone(),
            store,
            slot: slot.clone(),
            detector: detector.clone(),
            sequencer: sequencer.clone(),
            intervals,
            auto_start_cues: auto_start_cues.clone(),
            sensor_tx,
            watchdog: Mutex::new(Some(watchdog.spawn())),
            tasks: Mutex::new(Vec::new()),
        });

        let tasks = vec![
            tokio::spawn(pump_sensors(
                sensor_rx,
                slot.clone(),
                detector,
                sequencer.clone(),
            )),
            sequencer.listen(events.subscribe()),
            auto_start_cues.listen(events.subscribe()),
            tokio::spawn(start_on_request(events.subscribe(), slot)),
        ];
        *context.tasks.lock() = tasks;

        tracing::info!("Workout recorder context started");
        context
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkoutEvent> {
        self.events.subscribe()
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    /// Sender for sensor adapters; clone it once per adapter
    pub fn sensor_sender(&self) -> mpsc::Sender<SensorEvent> {
        self.sensor_tx.clone()
    }

    pub fn sequencer(&self) -> &AutoStartSequencer {
        &self.sequencer
    }

    pub fn auto_start_cues(&self) -> &AutoStartCues {
        &self.auto_start_cues
    }

    pub fn movement_detector(&self) -> &Arc<dyn MovementDetector> {
        &self.detector
    }

    pub fn recorder(&self) -> Option<Arc<dyn Recorder>> {
        self.slot.get()
    }

    fn current(&self) -> AppResult<Arc<dyn Recorder>> {
        self.slot.get().ok_or_else(|| RecorderError::NoRecorder.into())
    }

    fn env(&self) -> RecorderEnv {
        RecorderEnv {
            config: self.preferences.recorder_config(),
            clock: self.clock.clone(),
            events: self.events.clone(),
            store: self.store.clone(),
        }
    }

    fn install(&self, recorder: Arc<dyn Recorder>) {
        self.intervals.reset(recorder.interval_list());
        self.slot.set(recorder);
    }

    /// Create a GPS recorder and make it the current one
    pub fn new_gps_workout(&self, workout_type: &str, min_distance_m: f64) -> Arc<GpsRecorder> {
        let modality = GpsModality::new(self.preferences.gps_params(min_distance_m));
        let recorder = Arc::new(WorkoutRecorder::new(modality, workout_type, self.env()));
        self.install(recorder.clone());
        recorder
    }

    /// Create an indoor recorder and make it the current one
    pub fn new_indoor_workout(&self, workout_type: &str, min_repetitions: u32) -> Arc<IndoorRecorder> {
        let modality = IndoorModality::new(min_repetitions);
        let recorder = Arc::new(WorkoutRecorder::new(modality, workout_type, self.env()));
        self.install(recorder.clone());
        recorder
    }

    /// Load an interrupted workout from the store and continue it
    pub async fn restore_workout(
        &self,
        id: Uuid,
        gps_min_distance_m: f64,
        min_repetitions: u32,
    ) -> AppResult<Arc<dyn Recorder>> {
        let record = self.store.load(id).await?;
        let recorder: Arc<dyn Recorder> = match record.samples.recording_type() {
            RecordingType::Gps => Arc::new(GpsRecorder::restore_gps(
                record,
                self.preferences.gps_params(gps_min_distance_m),
                self.env(),
            )?),
            RecordingType::Indoor => Arc::new(IndoorRecorder::restore_indoor(
                record,
                min_repetitions,
                self.env(),
            )?),
        };
        tracing::info!("Restored workout {} in state {:?}", id, recorder.state());
        self.install(recorder.clone());
        Ok(recorder)
    }

    /// Replace the interval plan of the current workout
    pub fn set_intervals(&self, intervals: Vec<Interval>, interval_set_id: Option<i64>) -> AppResult<()> {
        let recorder = self.current()?;
        if let Some(id) = interval_set_id {
            recorder.set_used_interval_set(id);
        }
        recorder.set_interval_list(intervals.clone());
        self.intervals.set_intervals(intervals);
        Ok(())
    }

    pub fn set_comment(&self, comment: String) -> AppResult<()> {
        self.current()?.set_comment(comment);
        Ok(())
    }

    /// Manual start; cancels a pending auto-start
    pub fn start_workout(&self) -> AppResult<()> {
        let recorder = self.current()?;
        recorder.start("user request")?;
        if matches!(
            self.sequencer.state(),
            AutoStartState::Countdown | AutoStartState::WaitingForGps | AutoStartState::WaitingForMove
        ) {
            self.sequencer.abort(AbortReason::Started);
        }
        Ok(())
    }

    pub fn pause_workout(&self) -> AppResult<()> {
        self.current()?.pause();
        Ok(())
    }

    pub fn resume_workout(&self) -> AppResult<()> {
        self.current()?.resume()?;
        Ok(())
    }

    /// Stop the current workout and, if asked, hand it to the store
    pub fn stop_workout(&self, save: bool) -> AppResult<()> {
        let recorder = self.current()?;
        recorder.stop("user request");
        if self.detector.is_started() {
            self.detector.stop();
        }
        if save {
            recorder.save()?;
        }
        Ok(())
    }

    pub fn discard_workout(&self) -> AppResult<()> {
        let recorder = self.current()?;
        recorder.stop("discarded");
        recorder.discard()?;
        Ok(())
    }

    /// Begin auto-start with `config`, or the preference default
    pub fn begin_auto_start(&self, config: Option<AutoStartConfig>) -> AppResult<()> {
        let config = config.unwrap_or_else(|| self.sequencer.default_start_config());
        self.sequencer.begin(config)?;
        Ok(())
    }

    pub fn abort_auto_start(&self) {
        self.sequencer.abort(AbortReason::UserReq);
    }

    /// Stop the watchdog and every background task
    pub async fn shutdown(&self) {
        let watchdog = self.watchdog.lock().take();
        if let Some(watchdog) = watchdog {
            watchdog.shutdown();
            watchdog.join().await;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!("Workout recorder context stopped");
    }
}

/// Route sensor events to the current recorder, the movement detector and
/// the auto-start sequencer
async fn pump_sensors(
    mut rx: mpsc::Receiver<SensorEvent>,
    slot: RecorderSlot,
    detector: Arc<dyn MovementDetector>,
    sequencer: AutoStartSequencer,
) {
    while let Some(event) = rx.recv().await {
        tracing::trace!(?event, "sensor event");
        if let SensorEvent::GpsQuality { state } = event {
            sequencer.on_gps_state_changed(state);
        }
        detector.on_sensor_event(&event);
        if let Some(recorder) = slot.get() {
            recorder.on_sensor_event(&event);
        }
    }
    tracing::debug!("Sensor queue closed");
}

/// Start the current recorder once auto-start asks for it
async fn start_on_request(mut rx: broadcast::Receiver<WorkoutEvent>, slot: RecorderSlot) {
    loop {
        match rx.recv().await {
            Ok(WorkoutEvent::AutoStartStateChanged {
                new: AutoStartState::AutoStartRequested,
                ..
            }) => match slot.get() {
                Some(recorder) => {
                    if let Err(e) = recorder.start("Auto-Start") {
                        tracing::error!("Auto-start failed: {}", e);
                    }
                }
                None => tracing::warn!("Auto-start requested without a recorder"),
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Auto-start glue lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
