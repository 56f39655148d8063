//! Watchdog supervisor
//!
//! Drives `Recorder::handle_watchdog` every 2.5 seconds and runs the
//! registered per-tick components after each successful step.

use crate::recorder::Recorder;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(2_500);

/// Work that piggybacks on the watchdog tick
pub trait WatchdogComponent: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, recorder: &dyn Recorder);
}

/// Shared, swappable reference to the current recorder
#[derive(Clone, Default)]
pub struct RecorderSlot {
    inner: Arc<RwLock<Option<Arc<dyn Recorder>>>>,
}

impl RecorderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, recorder: Arc<dyn Recorder>) {
        tracing::debug!("Recorder slot now holds {}", recorder.id());
        *self.inner.write() = Some(recorder);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn get(&self) -> Option<Arc<dyn Recorder>> {
        self.inner.read().clone()
    }
}

/// Result of a single watchdog step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The recorder is active; components were checked
    Active,
    Inactive,
    /// No recorder in the slot
    Empty,
    /// The step failed and was logged
    Failed,
}

pub struct Watchdog {
    slot: RecorderSlot,
    components: Vec<Arc<dyn WatchdogComponent>>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(slot: RecorderSlot) -> Self {
        Self {
            slot,
            components: Vec::new(),
            interval: WATCHDOG_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn add_component(&mut self, component: Arc<dyn WatchdogComponent>) {
        tracing::debug!("Adding watchdog component: {}", component.name());
        self.components.push(component);
    }

    /// Run one supervision step. Failures never escape.
    pub fn tick(&self) -> TickOutcome {
        let Some(recorder) = self.slot.get() else {
            return TickOutcome::Empty;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| recorder.handle_watchdog())) {
            Ok(Ok(true)) => {
                self.check_components(recorder.as_ref());
                TickOutcome::Active
            }
            Ok(Ok(false)) => TickOutcome::Inactive,
            Ok(Err(e)) => {
                tracing::warn!("Watchdog tick failed: {}", e);
                TickOutcome::Failed
            }
            Err(_) => {
                tracing::error!("Watchdog tick panicked");
                TickOutcome::Failed
            }
        }
    }

    fn check_components(&self, recorder: &dyn Recorder) {
        for component in &self.components {
            let result = panic::catch_unwind(AssertUnwindSafe(|| component.check(recorder)));
            if result.is_err() {
                tracing::error!("Watchdog component {} panicked", component.name());
            }
        }
    }

    /// Start the supervision loop on the current tokio runtime
    pub fn spawn(self) -> WatchdogHandle {
        let shutdown = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(self.run(shutdown.clone(), running.clone()));
        WatchdogHandle {
            shutdown,
            running,
            task,
        }
    }

    async fn run(self, shutdown: Arc<Notify>, running: Arc<AtomicBool>) {
        tracing::info!("Watchdog started, interval {:?}", self.interval);
        while running.load(Ordering::SeqCst) {
            let outcome = self.tick();
            tracing::trace!(?outcome, "watchdog tick");

            // inactive or missing recorders are rechecked after one interval
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.notified() => break,
            }
        }
        running.store(false, Ordering::SeqCst);
        tracing::info!("Watchdog stopped");
    }
}

/// Handle to a running watchdog loop
pub struct WatchdogHandle {
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to end after its current step
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Watchdog task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{drain, EventBus, SensorEvent, WorkoutEvent};
    use crate::recorder::{
        IndoorModality, IndoorRecorder, RecorderConfig, RecorderEnv, RecordingState,
        WorkoutRecorder,
    };
    use crate::store::MemoryStore;
    use crate::utils::{Clock, TokioClock};
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl WatchdogComponent for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn check(&self, _recorder: &dyn Recorder) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Exploding;

    impl WatchdogComponent for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn check(&self, _recorder: &dyn Recorder) {
            panic!("component failure");
        }
    }

    fn recorder(events: &EventBus, clock: Arc<TokioClock>, config: RecorderConfig) -> Arc<IndoorRecorder> {
        Arc::new(WorkoutRecorder::new(
            IndoorModality::new(1),
            "treadmill",
            RecorderEnv {
                config,
                clock,
                events: events.clone(),
                store: Arc::new(MemoryStore::new()),
            },
        ))
    }

    fn feed(recorder: &IndoorRecorder, clock: &TokioClock, count: usize) {
        for _ in 0..count {
            recorder.on_sensor_event(&SensorEvent::Repetition {
                timestamp_ms: clock.now_ms(),
                intensity: 1.0,
            });
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_timeout_fires_once_under_supervision() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let clock = Arc::new(TokioClock::anchored_at(1_000_000));
        let config = RecorderConfig {
            use_auto_pause: true,
            auto_timeout: Duration::from_millis(5_000),
        };
        let recorder = recorder(&events, clock.clone(), config);
        recorder.start("test").unwrap();
        sleep_ms(100).await;
        feed(&recorder, &clock, 3);

        let slot = RecorderSlot::new();
        slot.set(recorder.clone());
        let handle = Watchdog::new(slot).spawn();

        sleep_ms(20_000).await;
        assert_eq!(recorder.state(), RecordingState::Stopped);
        let auto_stops = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, WorkoutEvent::AutoStop { .. }))
            .count();
        assert_eq!(auto_stops, 1);
        assert!(handle.is_running());

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_pause_and_resume_under_supervision() {
        let events = EventBus::new();
        let clock = Arc::new(TokioClock::anchored_at(0));
        let recorder = recorder(&events, clock.clone(), RecorderConfig::default());
        recorder.start("test").unwrap();
        sleep_ms(100).await;
        feed(&recorder, &clock, 3);

        let slot = RecorderSlot::new();
        slot.set(recorder.clone());
        let handle = Watchdog::new(slot).spawn();

        // ticks at 10.1 s (gap 10 s) and 12.6 s (gap 12.5 s)
        sleep_ms(12_000).await;
        assert_eq!(recorder.state(), RecordingState::Running);
        sleep_ms(1_000).await;
        assert_eq!(recorder.state(), RecordingState::Paused);

        feed(&recorder, &clock, 1);
        sleep_ms(2_500).await;
        assert_eq!(recorder.state(), RecordingState::Running);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_component_does_not_stop_loop() {
        let events = EventBus::new();
        let clock = Arc::new(TokioClock::anchored_at(0));
        let recorder = recorder(&events, clock, RecorderConfig::default());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let slot = RecorderSlot::new();
        slot.set(recorder);
        let mut watchdog = Watchdog::new(slot);
        watchdog.add_component(Arc::new(Exploding));
        watchdog.add_component(counter.clone());
        let handle = watchdog.spawn();

        sleep_ms(6_000).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        assert!(handle.is_running());
        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_can_be_swapped_in_later() {
        let events = EventBus::new();
        let clock = Arc::new(TokioClock::anchored_at(0));
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let slot = RecorderSlot::new();
        let mut watchdog = Watchdog::new(slot.clone());
        watchdog.add_component(counter.clone());
        assert_eq!(watchdog.tick(), TickOutcome::Empty);
        let handle = watchdog.spawn();

        sleep_ms(3_000).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        let recorder = recorder(&events, clock, RecorderConfig::default());
        slot.set(recorder.clone());
        sleep_ms(2_500).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        recorder.stop("test");
        sleep_ms(5_000).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_loop() {
        let handle = Watchdog::new(RecorderSlot::new()).spawn();
        sleep_ms(100).await;
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
    }
}
