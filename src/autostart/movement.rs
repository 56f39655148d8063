//! Movement detection for the on-move auto-start mode

use crate::events::{DetectionState, GpsFix, SensorEvent};
use crate::recorder::gps::spherical_distance;
use parking_lot::Mutex;

/// Minimum spacing between two fixes compared for movement
const MIN_FIX_SPACING_MS: i64 = 500;

/// Tells whether the user has started moving
pub trait MovementDetector: Send + Sync {
    /// Start detecting; false if the detector cannot be started
    fn start(&self) -> bool;
    /// Stop detecting; false if it was not running
    fn stop(&self) -> bool;
    fn is_started(&self) -> bool;
    fn detection_state(&self) -> DetectionState;

    fn on_sensor_event(&self, _event: &SensorEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug)]
struct DetectorInner {
    state: DetectorState,
    detection: DetectionState,
    last_fix: Option<GpsFix>,
}

/// Location-based detector: moving once a fix is far enough from the
/// previous one, using the same distance and spacing filter as recording.
#[derive(Debug)]
pub struct DefaultMovementDetector {
    min_distance_m: f64,
    inner: Mutex<DetectorInner>,
}

impl DefaultMovementDetector {
    pub fn new(min_distance_m: f64) -> Self {
        Self {
            min_distance_m,
            inner: Mutex::new(DetectorInner {
                state: DetectorState::Idle,
                detection: DetectionState::NotSure,
                last_fix: None,
            }),
        }
    }

    fn on_fix(&self, fix: GpsFix) {
        let mut inner = self.inner.lock();
        if inner.state == DetectorState::Running {
            if let Some(last) = inner.last_fix {
                let distance = spherical_distance(last.lat, last.lon, fix.lat, fix.lon).abs();
                let time_diff = fix.timestamp_ms - last.timestamp_ms;
                if distance < self.min_distance_m || time_diff < MIN_FIX_SPACING_MS {
                    inner.detection = DetectionState::NotMoving;
                } else {
                    tracing::debug!("Movement detected, {:.1} m in {} ms", distance, time_diff);
                    inner.detection = DetectionState::Moving;
                    inner.last_fix = Some(fix);
                }
                return;
            }
        }
        inner.detection = DetectionState::NotSure;
        inner.last_fix = Some(fix);
    }
}

impl MovementDetector for DefaultMovementDetector {
    fn start(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == DetectorState::Running {
            return false;
        }
        inner.state = DetectorState::Running;
        inner.detection = DetectionState::NotSure;
        tracing::debug!("Movement detector started");
        true
    }

    fn stop(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != DetectorState::Running {
            return false;
        }
        inner.state = DetectorState::Stopped;
        tracing::debug!("Movement detector stopped");
        true
    }

    fn is_started(&self) -> bool {
        self.inner.lock().state == DetectorState::Running
    }

    fn detection_state(&self) -> DetectionState {
        self.inner.lock().detection
    }

    fn on_sensor_event(&self, event: &SensorEvent) {
        match event {
            SensorEvent::Location { fix } => self.on_fix(*fix),
            // an external classifier overrides the location heuristic
            SensorEvent::Movement { state } => {
                let mut inner = self.inner.lock();
                if inner.state == DetectorState::Running {
                    inner.detection = *state;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(lat: f64, t: i64) -> SensorEvent {
        SensorEvent::Location {
            fix: GpsFix {
                lat,
                lon: 8.0,
                altitude: 0.0,
                speed: 0.0,
                accuracy: 5.0,
                timestamp_ms: t,
            },
        }
    }

    #[test]
    fn test_not_sure_until_two_fixes() {
        let detector = DefaultMovementDetector::new(5.0);
        assert!(detector.start());
        assert!(!detector.start());
        detector.on_sensor_event(&location(50.0, 0));
        assert_eq!(detector.detection_state(), DetectionState::NotSure);

        detector.on_sensor_event(&location(50.00001, 1_000));
        assert_eq!(detector.detection_state(), DetectionState::NotMoving);

        detector.on_sensor_event(&location(50.001, 2_000));
        assert_eq!(detector.detection_state(), DetectionState::Moving);
    }

    #[test]
    fn test_fixes_before_start_only_prime() {
        let detector = DefaultMovementDetector::new(5.0);
        detector.on_sensor_event(&location(50.0, 0));
        detector.on_sensor_event(&location(50.01, 5_000));
        assert_eq!(detector.detection_state(), DetectionState::NotSure);

        detector.start();
        detector.on_sensor_event(&location(50.02, 10_000));
        assert_eq!(detector.detection_state(), DetectionState::Moving);
        assert!(detector.stop());
        assert!(!detector.is_started());
        assert!(!detector.stop());
    }

    #[test]
    fn test_external_classification_applies_while_running() {
        let detector = DefaultMovementDetector::new(5.0);
        let moving = SensorEvent::Movement {
            state: DetectionState::Moving,
        };
        detector.on_sensor_event(&moving);
        assert_eq!(detector.detection_state(), DetectionState::NotSure);
        detector.start();
        detector.on_sensor_event(&moving);
        assert_eq!(detector.detection_state(), DetectionState::Moving);
    }
}
