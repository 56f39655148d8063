//! Auto-start sequencer
//!
//! `begin` and `abort` mutate the sequencer synchronously; the countdown and
//! the GPS/movement waits run as tokio tasks that re-enter through the same
//! lock. Every begin/abort bumps a generation counter, so a task that was
//! superseded drops whatever it was about to do.

use super::movement::MovementDetector;
use super::{AbortReason, AutoStartConfig, AutoStartMode, AutoStartState};
use crate::events::{CountdownTick, DetectionState, EventBus, WorkoutEvent};
use crate::recorder::GpsState;
use crate::utils::AutoStartError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const COUNTDOWN_TICK_MS: i64 = 1_000;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Gps,
    Move,
}

enum Poll {
    Ready,
    Waiting,
    Stale,
}

struct State {
    state: AutoStartState,
    countdown_ms: i64,
    last_config: AutoStartConfig,
    default_config: AutoStartConfig,
    gps_okay: bool,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    events: EventBus,
    detector: Arc<dyn MovementDetector>,
}

/// Cloneable handle to one auto-start sequence
#[derive(Clone)]
pub struct AutoStartSequencer {
    shared: Arc<Shared>,
}

impl AutoStartSequencer {
    pub fn new(
        default_config: AutoStartConfig,
        detector: Arc<dyn MovementDetector>,
        events: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    state: AutoStartState::Idle,
                    countdown_ms: 0,
                    last_config: default_config,
                    default_config,
                    gps_okay: false,
                    generation: 0,
                    task: None,
                }),
                events,
                detector,
            }),
        }
    }

    pub fn state(&self) -> AutoStartState {
        self.shared.state.lock().state
    }

    pub fn countdown_ms(&self) -> i64 {
        self.shared.state.lock().countdown_ms
    }

    pub fn last_start_config(&self) -> AutoStartConfig {
        self.shared.state.lock().last_config
    }

    pub fn default_start_config(&self) -> AutoStartConfig {
        self.shared.state.lock().default_config
    }

    pub fn set_default_start_config(&self, config: AutoStartConfig) {
        self.shared.state.lock().default_config = config;
    }

    pub fn is_gps_okay(&self) -> bool {
        self.shared.state.lock().gps_okay
    }

    /// Begin a new sequence, cancelling whatever ran before
    pub fn begin(&self, config: AutoStartConfig) -> Result<(), AutoStartError> {
        let runtime = Handle::try_current().map_err(|_| AutoStartError::NoRuntime)?;
        let mut state = self.shared.state.lock();
        let generation = state.cancel();
        tracing::info!(
            "Auto-start begin: {} ms, mode {:?}",
            config.countdown_ms,
            config.mode
        );

        self.shared.set_countdown(&mut state, config.countdown_ms);
        state.last_config = config;

        if config.countdown_ms > 0 {
            if state.state != AutoStartState::Countdown {
                self.shared.set_state(&mut state, AutoStartState::Countdown);
            }
            let shared = self.shared.clone();
            state.task = Some(runtime.spawn(shared.run_countdown(generation, config.countdown_ms)));
        } else if let Some(wait) = self.shared.start_with_mode(&mut state) {
            let shared = self.shared.clone();
            state.task = Some(runtime.spawn(shared.run_wait(generation, wait)));
        }
        Ok(())
    }

    /// Cancel the running sequence
    pub fn abort(&self, reason: AbortReason) {
        let mut state = self.shared.state.lock();
        state.cancel();
        tracing::info!("Auto-start aborted: {:?}", reason);
        let new = match reason {
            AbortReason::UserReq => AutoStartState::AbortedByUser,
            AbortReason::Started => AutoStartState::AbortedAlreadyStarted,
        };
        self.shared.set_state(&mut state, new);
    }

    pub fn on_gps_state_changed(&self, new: GpsState) {
        self.shared.state.lock().gps_okay = new == GpsState::SignalGood;
    }

    /// Track GPS quality from the event bus until it closes
    pub fn listen(&self, mut rx: broadcast::Receiver<WorkoutEvent>) -> JoinHandle<()> {
        let sequencer = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(WorkoutEvent::GpsStateChanged { new, .. }) => {
                        sequencer.on_gps_state_changed(new)
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Auto-start listener lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl State {
    /// Invalidate in-flight timers and return the new generation
    fn cancel(&mut self) -> u64 {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation
    }
}

impl Shared {
    fn set_state(&self, state: &mut State, new: AutoStartState) {
        let old = std::mem::replace(&mut state.state, new);
        tracing::debug!("Auto-start state: {:?} -> {:?}", old, new);
        self.events
            .publish(WorkoutEvent::AutoStartStateChanged { old, new });
    }

    fn set_countdown(&self, state: &mut State, countdown_ms: i64) {
        state.countdown_ms = countdown_ms;
        self.events
            .publish(WorkoutEvent::CountdownChanged(CountdownTick::new(countdown_ms)));
    }

    /// Enter the configured mode; returns what still has to be waited for
    fn start_with_mode(&self, state: &mut State) -> Option<Wait> {
        match state.last_config.mode {
            AutoStartMode::Instant => {
                self.set_state(state, AutoStartState::AutoStartRequested);
                None
            }
            AutoStartMode::WaitForGps => {
                if state.gps_okay {
                    self.set_state(state, AutoStartState::AutoStartRequested);
                    return None;
                }
                if state.state != AutoStartState::WaitingForGps {
                    self.set_state(state, AutoStartState::WaitingForGps);
                }
                Some(Wait::Gps)
            }
            AutoStartMode::OnMove => {
                if state.state != AutoStartState::WaitingForMove {
                    self.set_state(state, AutoStartState::WaitingForMove);
                }
                Some(Wait::Move)
            }
        }
    }

    async fn run_countdown(self: Arc<Self>, generation: u64, countdown_ms: i64) {
        let mut remaining = countdown_ms;
        while remaining > 0 {
            let step = remaining.min(COUNTDOWN_TICK_MS);
            tokio::time::sleep(Duration::from_millis(step as u64)).await;
            remaining -= step;

            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            tracing::debug!("Remaining: {}", remaining);
            self.set_countdown(&mut state, remaining);
        }

        let wait = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            self.start_with_mode(&mut state)
        };
        if let Some(wait) = wait {
            self.run_wait(generation, wait).await;
        }
    }

    async fn run_wait(self: Arc<Self>, generation: u64, wait: Wait) {
        loop {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            match self.poll(generation, wait) {
                Poll::Waiting => continue,
                Poll::Ready | Poll::Stale => return,
            }
        }
    }

    fn poll(&self, generation: u64, wait: Wait) -> Poll {
        let mut state = self.state.lock();
        if state.generation != generation {
            return Poll::Stale;
        }
        let ready = match wait {
            Wait::Gps => {
                if !state.gps_okay {
                    tracing::debug!("Still no GPS fix...");
                }
                state.gps_okay
            }
            Wait::Move => self.user_is_moving(),
        };
        if !ready {
            return Poll::Waiting;
        }
        tracing::info!("Auto-start condition met after {:?} wait", wait);
        self.set_state(&mut state, AutoStartState::AutoStartRequested);
        Poll::Ready
    }

    fn user_is_moving(&self) -> bool {
        if !self.detector.is_started() {
            tracing::warn!("Waiting for movement, but detector is not started. Starting it now.");
            if !self.detector.start() {
                tracing::error!("Failed to start movement detector");
                return false;
            }
        }
        let moving = self.detector.is_started()
            && self.detector.detection_state() == DetectionState::Moving;
        if !moving {
            tracing::debug!("Still no movement...");
        }
        moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autostart::DefaultMovementDetector;
    use crate::events::{drain, SensorEvent};

    fn sequencer(events: &EventBus) -> (AutoStartSequencer, Arc<DefaultMovementDetector>) {
        let detector = Arc::new(DefaultMovementDetector::new(5.0));
        let sequencer =
            AutoStartSequencer::new(AutoStartConfig::default(), detector.clone(), events.clone());
        (sequencer, detector)
    }

    fn countdowns(events: &[WorkoutEvent]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkoutEvent::CountdownChanged(tick) => Some(tick.countdown_ms),
                _ => None,
            })
            .collect()
    }

    fn transitions(events: &[WorkoutEvent]) -> Vec<AutoStartState> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkoutEvent::AutoStartStateChanged { new, .. } => Some(*new),
                _ => None,
            })
            .collect()
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_emits_four_ticks_then_requests_start() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (sequencer, _) = sequencer(&events);

        sequencer
            .begin(AutoStartConfig::new(3_000, AutoStartMode::Instant))
            .unwrap();
        assert_eq!(sequencer.state(), AutoStartState::Countdown);
        sleep_ms(5_000).await;

        let events = drain(&mut rx);
        assert_eq!(countdowns(&events), vec![3_000, 2_000, 1_000, 0]);
        assert_eq!(
            transitions(&events),
            vec![AutoStartState::Countdown, AutoStartState::AutoStartRequested]
        );
        // the final tick precedes the start request
        assert!(matches!(
            events.last(),
            Some(WorkoutEvent::AutoStartStateChanged {
                new: AutoStartState::AutoStartRequested,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_mid_countdown_stops_ticks() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (sequencer, _) = sequencer(&events);

        sequencer
            .begin(AutoStartConfig::new(3_000, AutoStartMode::Instant))
            .unwrap();
        sleep_ms(1_500).await;
        sequencer.abort(AbortReason::UserReq);
        sleep_ms(5_000).await;

        let events = drain(&mut rx);
        assert_eq!(countdowns(&events), vec![3_000, 2_000]);
        assert_eq!(
            transitions(&events),
            vec![AutoStartState::Countdown, AutoStartState::AbortedByUser]
        );
        assert_eq!(sequencer.state(), AutoStartState::AbortedByUser);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_begin_replaces_first() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (sequencer, _) = sequencer(&events);

        sequencer
            .begin(AutoStartConfig::new(3_000, AutoStartMode::Instant))
            .unwrap();
        sleep_ms(500).await;
        sequencer
            .begin(AutoStartConfig::new(2_000, AutoStartMode::Instant))
            .unwrap();
        sleep_ms(5_000).await;

        let events = drain(&mut rx);
        assert_eq!(countdowns(&events), vec![3_000, 2_000, 1_000, 0]);
        let requested = transitions(&events)
            .into_iter()
            .filter(|s| *s == AutoStartState::AutoStartRequested)
            .count();
        assert_eq!(requested, 1);
        assert_eq!(sequencer.last_start_config().countdown_ms, 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_countdown_instant_starts_immediately() {
        let events = EventBus::new();
        let (sequencer, _) = sequencer(&events);
        sequencer
            .begin(AutoStartConfig::new(0, AutoStartMode::Instant))
            .unwrap();
        assert_eq!(sequencer.state(), AutoStartState::AutoStartRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_good_gps() {
        let events = EventBus::new();
        let (sequencer, _) = sequencer(&events);
        let listener = sequencer.listen(events.subscribe());

        sequencer
            .begin(AutoStartConfig::new(0, AutoStartMode::WaitForGps))
            .unwrap();
        assert_eq!(sequencer.state(), AutoStartState::WaitingForGps);
        sleep_ms(2_000).await;
        assert_eq!(sequencer.state(), AutoStartState::WaitingForGps);

        events.publish(WorkoutEvent::GpsStateChanged {
            old: GpsState::SignalLost,
            new: GpsState::SignalGood,
        });
        sleep_ms(600).await;
        assert_eq!(sequencer.state(), AutoStartState::AutoStartRequested);
        listener.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_good_gps_skips_waiting() {
        let events = EventBus::new();
        let (sequencer, _) = sequencer(&events);
        sequencer.on_gps_state_changed(GpsState::SignalGood);
        sequencer
            .begin(AutoStartConfig::new(0, AutoStartMode::WaitForGps))
            .unwrap();
        assert_eq!(sequencer.state(), AutoStartState::AutoStartRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_move_starts_detector_and_waits_for_movement() {
        let events = EventBus::new();
        let (sequencer, detector) = sequencer(&events);

        sequencer
            .begin(AutoStartConfig::new(1_000, AutoStartMode::OnMove))
            .unwrap();
        sleep_ms(1_600).await;
        assert_eq!(sequencer.state(), AutoStartState::WaitingForMove);
        assert!(detector.is_started());

        detector.on_sensor_event(&SensorEvent::Movement {
            state: DetectionState::Moving,
        });
        sleep_ms(500).await;
        assert_eq!(sequencer.state(), AutoStartState::AutoStartRequested);
    }

    #[test]
    fn test_begin_requires_runtime() {
        let events = EventBus::new();
        let (sequencer, _) = sequencer(&events);
        assert_eq!(
            sequencer.begin(AutoStartConfig::default()),
            Err(AutoStartError::NoRuntime)
        );
        assert_eq!(sequencer.state(), AutoStartState::Idle);
    }
}
