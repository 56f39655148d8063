//! Auto-start feedback
//!
//! Turns countdown ticks and auto-start transitions into cues. Spoken
//! countdowns replace the beeps unless announcements are off or no speech
//! engine is available; vibration is always on.

use super::countdown::CountdownAnnouncements;
use super::{Announcement, Cue, CueSink, Tone};
use crate::autostart::AutoStartState;
use crate::events::{CountdownTick, WorkoutEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const COUNTDOWN_TONE: Duration = Duration::from_millis(350);
const START_TONE: Duration = Duration::from_millis(1_000);
const COUNTDOWN_VIBRATION: Duration = Duration::from_millis(500);
const START_VIBRATION: Duration = Duration::from_millis(1_000);

pub struct AutoStartCues {
    sink: Arc<dyn CueSink>,
    announcements_enabled: bool,
    tts_available: AtomicBool,
    countdown: Mutex<CountdownAnnouncements>,
}

impl AutoStartCues {
    pub fn new(sink: Arc<dyn CueSink>, announcements_enabled: bool) -> Self {
        Self {
            sink,
            announcements_enabled,
            tts_available: AtomicBool::new(true),
            countdown: Mutex::new(CountdownAnnouncements::new()),
        }
    }

    pub fn set_tts_available(&self, available: bool) {
        self.tts_available.store(available, Ordering::SeqCst);
    }

    fn speaking(&self) -> bool {
        self.announcements_enabled && self.tts_available.load(Ordering::SeqCst)
    }

    pub fn handle(&self, event: &WorkoutEvent) {
        match event {
            WorkoutEvent::CountdownChanged(tick) => self.on_countdown(*tick),
            WorkoutEvent::AutoStartStateChanged { old, new } => self.on_state(*old, *new),
            _ => {}
        }
    }

    fn on_countdown(&self, tick: CountdownTick) {
        let s = tick.countdown_s;
        if self.speaking() {
            if let Some(announcement) = self.countdown.lock().select(s) {
                self.sink.emit(Cue::Speak(announcement));
            }
        } else if 0 < s && s <= 10 {
            self.sink.emit(Cue::Tone {
                tone: Tone::CountdownBeep,
                duration: COUNTDOWN_TONE,
            });
        }

        if 0 < s && s <= 3 {
            self.sink.emit(Cue::Vibrate {
                duration: COUNTDOWN_VIBRATION,
            });
        }
    }

    fn on_state(&self, old: AutoStartState, new: AutoStartState) {
        if self.speaking() {
            let spoken = match new {
                AutoStartState::WaitingForGps => Some(Announcement::WaitingForGps),
                AutoStartState::WaitingForMove => Some(Announcement::WaitingForMove),
                AutoStartState::AbortedByUser
                    if matches!(
                        old,
                        AutoStartState::Countdown | AutoStartState::WaitingForGps
                    ) =>
                {
                    Some(Announcement::AutoStartAborted)
                }
                _ => None,
            };
            if let Some(announcement) = spoken {
                self.sink.emit(Cue::Speak(announcement));
            }
        }

        if new != old && new == AutoStartState::AutoStartRequested {
            if !self.speaking() {
                self.sink.emit(Cue::Tone {
                    tone: Tone::StartSignal,
                    duration: START_TONE,
                });
            }
            self.sink.emit(Cue::Vibrate {
                duration: START_VIBRATION,
            });
        }
    }

    /// Follow the event bus until it closes
    pub fn listen(self: Arc<Self>, mut rx: broadcast::Receiver<WorkoutEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Auto-start cues lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
