//! Interval announcements
//!
//! Checked on every watchdog tick; fires at most one interval per check.

use super::{Announcement, Cue, CueSink};
use crate::events::{EventBus, WorkoutEvent};
use crate::recorder::{Interval, Recorder};
use crate::watchdog::WatchdogComponent;
use parking_lot::Mutex;
use std::sync::Arc;

struct Progress {
    intervals: Vec<Interval>,
    /// Index of the last triggered interval
    index: Option<usize>,
    next_due_ms: i64,
}

pub struct IntervalAnnouncements {
    progress: Mutex<Progress>,
    includes_pauses: bool,
    sink: Arc<dyn CueSink>,
    events: EventBus,
}

impl IntervalAnnouncements {
    pub fn new(
        intervals: Vec<Interval>,
        includes_pauses: bool,
        sink: Arc<dyn CueSink>,
        events: EventBus,
    ) -> Self {
        Self {
            progress: Mutex::new(Progress {
                intervals,
                index: None,
                next_due_ms: 0,
            }),
            includes_pauses,
            sink,
            events,
        }
    }

    pub fn set_intervals(&self, intervals: Vec<Interval>) {
        self.progress.lock().intervals = intervals;
    }

    /// Start over with a new plan, as for a fresh workout
    pub fn reset(&self, intervals: Vec<Interval>) {
        let mut progress = self.progress.lock();
        progress.intervals = intervals;
        progress.index = None;
        progress.next_due_ms = 0;
    }

    fn elapsed_ms(&self, recorder: &dyn Recorder) -> i64 {
        if self.includes_pauses {
            recorder.time_since_start_ms()
        } else {
            recorder.duration_ms()
        }
    }

    /// Trigger the next interval if it is due
    pub fn check_recorder(&self, recorder: &dyn Recorder) {
        let elapsed = self.elapsed_ms(recorder);
        let mut progress = self.progress.lock();
        if elapsed <= progress.next_due_ms || progress.intervals.is_empty() {
            return;
        }

        let index = match progress.index {
            Some(i) if i + 1 < progress.intervals.len() => i + 1,
            _ => 0,
        };
        let interval = progress.intervals[index];
        progress.index = Some(index);
        progress.next_due_ms += interval.delay_millis;
        drop(progress);

        tracing::debug!("Interval {} triggered at {} ms", interval.id, elapsed);
        self.sink.emit(Cue::Speak(Announcement::Interval {
            interval_id: interval.id,
        }));
        recorder.on_interval_triggered(interval.id);
        self.events.publish(WorkoutEvent::IntervalTriggered {
            interval_id: interval.id,
        });
    }
}

impl WatchdogComponent for IntervalAnnouncements {
    fn name(&self) -> &'static str {
        "interval-announcements"
    }

    fn check(&self, recorder: &dyn Recorder) {
        self.check_recorder(recorder);
    }
}
