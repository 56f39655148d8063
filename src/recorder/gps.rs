//! GPS recording modality
//!
//! Turns position fixes into track samples, keeps the running distance and
//! classifies GPS signal quality on every watchdog tick.

use super::modality::{Ingest, IngestContext, Modality, TimedSample};
use super::state::{RecordingType, Session};
use crate::events::{GpsFix, SensorEvent, WorkoutEvent};
use crate::store::WorkoutSamples;
use serde::{Deserialize, Serialize};

/// Accuracy above which a fix counts as bad, in meters
const SIGNAL_BAD_THRESHOLD_M: f64 = 30.0;
/// Fix age after which the signal counts as lost
const SIGNAL_LOST_THRESHOLD_MS: i64 = 10_000;
/// Minimum spacing between two recorded fixes
const MIN_SAMPLE_SPACING_MS: i64 = 500;
/// Equatorial radius used for spherical distances
const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Standard sea-level pressure in hPa
const PRESSURE_STANDARD_ATMOSPHERE: f64 = 1013.25;

/// GPS signal quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GpsState {
    SignalLost,
    SignalGood,
    SignalBad,
}

impl Default for GpsState {
    fn default() -> Self {
        Self::SignalLost
    }
}

/// One recorded track point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsSample {
    pub absolute_time: i64,
    pub relative_time: i64,
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
    pub speed: f64,
    pub pressure: Option<f32>,
    pub heart_rate: Option<u32>,
    pub interval_triggered: Option<i64>,
}

impl TimedSample for GpsSample {
    fn absolute_time(&self) -> i64 {
        self.absolute_time
    }

    fn relative_time(&self) -> i64 {
        self.relative_time
    }
}

/// Workout-type and preference parameters of GPS recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsParams {
    /// Minimum distance between two samples in meters
    pub min_distance_m: f64,
    /// Report current speed as an average over a window instead of the last fix
    pub use_average_for_current_speed: bool,
    pub current_speed_window_ms: i64,
}

impl Default for GpsParams {
    fn default() -> Self {
        Self {
            min_distance_m: 5.0,
            use_average_for_current_speed: false,
            current_speed_window_ms: 15_000,
        }
    }
}

/// Great-circle distance between two coordinates in meters
pub fn spherical_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Altitude in meters for a barometric pressure in hPa
pub fn pressure_altitude(pressure_hpa: f64) -> f64 {
    44_330.0 * (1.0 - (pressure_hpa / PRESSURE_STANDARD_ATMOSPHERE).powf(1.0 / 5.255))
}

#[derive(Debug, Default)]
pub struct GpsModality {
    params: GpsParams,
    samples: Vec<GpsSample>,
    distance_m: f64,
    last_fix: Option<GpsFix>,
    gps_state: GpsState,
    last_pressure: Option<f32>,
}

impl GpsModality {
    pub fn new(params: GpsParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Rebuild from persisted samples, recomputing the distance
    pub fn with_samples(params: GpsParams, samples: Vec<GpsSample>) -> Self {
        let distance_m = samples
            .windows(2)
            .map(|pair| spherical_distance(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon))
            .sum();
        Self {
            params,
            samples,
            distance_m,
            ..Self::default()
        }
    }

    pub fn gps_state(&self) -> GpsState {
        self.gps_state
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Average speed over active time in m/s
    pub fn avg_speed(&self, duration_ms: i64) -> f64 {
        let seconds = duration_ms / 1000;
        if seconds <= 0 {
            return 0.0;
        }
        self.distance_m / seconds as f64
    }

    /// Average pace in minutes per kilometer
    pub fn avg_pace(&self, duration_ms: i64) -> f64 {
        let speed = self.avg_speed(duration_ms);
        if speed < 0.001 {
            0.0
        } else {
            (1.0 / speed) * 1000.0 / 60.0
        }
    }

    /// Current speed in m/s, either from the last fix or averaged
    pub fn current_speed(&self, duration_ms: i64, last_resume_ms: i64) -> f64 {
        let Some(last) = self.samples.last() else {
            return 0.0;
        };
        if !self.params.use_average_for_current_speed
            || self.params.current_speed_window_ms == 0
            || self.samples.len() == 1
        {
            last.speed
        } else {
            self.windowed_speed(self.params.current_speed_window_ms, duration_ms, last_resume_ms)
        }
    }

    /// Average speed of the samples within `window_ms` of active time,
    /// not reaching back across the last resume
    pub fn windowed_speed(&self, window_ms: i64, duration_ms: i64, last_resume_ms: i64) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let min_time = duration_ms - window_ms;
        let first = &self.samples[self.samples.len() - 1];
        let mut previous = first;
        let mut distance = 0.0;
        for sample in self.samples.iter().rev() {
            if last_resume_ms != 0 && sample.absolute_time < last_resume_ms {
                break;
            }
            if sample.relative_time <= min_time {
                break;
            }
            distance += spherical_distance(sample.lat, sample.lon, previous.lat, previous.lon);
            previous = sample;
        }
        let time_diff = first.relative_time - previous.relative_time;
        if time_diff == 0 {
            return 0.0;
        }
        distance / (time_diff as f64 / 1000.0)
    }

    /// Total ascent in meters from smoothed barometric altitude
    pub fn ascent_m(&self) -> f64 {
        let mut ascent = 0.0;
        let mut last_elevation: Option<f64> = None;
        for pressure in self.samples.iter().filter_map(|s| s.pressure) {
            let raw = pressure_altitude(pressure as f64);
            let previous = last_elevation.unwrap_or(raw);
            let elevation = (raw + previous * 9.0) / 10.0;
            if elevation > previous {
                ascent += elevation - previous;
            }
            last_elevation = Some(elevation);
        }
        ascent
    }

    fn classify(&self, fix: &GpsFix, now_ms: i64) -> GpsState {
        if now_ms - fix.timestamp_ms > SIGNAL_LOST_THRESHOLD_MS {
            GpsState::SignalLost
        } else if fix.accuracy > SIGNAL_BAD_THRESHOLD_M {
            GpsState::SignalBad
        } else {
            GpsState::SignalGood
        }
    }

    fn ingest_fix(&mut self, fix: GpsFix, ctx: &mut IngestContext<'_>) -> Ingest {
        self.last_fix = Some(fix);
        if !ctx.state.is_active() {
            return Ingest::Ignored;
        }

        let mut step_m = 0.0;
        if let Some(last) = self.samples.last() {
            step_m = spherical_distance(last.lat, last.lon, fix.lat, fix.lon).abs();
            let time_diff = (last.absolute_time - fix.timestamp_ms).abs();
            if step_m < self.params.min_distance_m || time_diff < MIN_SAMPLE_SPACING_MS {
                return Ingest::Ignored;
            }
        }

        if !ctx.accepting || fix.timestamp_ms <= ctx.start_ms {
            return Ingest::Observed;
        }

        self.distance_m += step_m;
        let sample = GpsSample {
            absolute_time: fix.timestamp_ms,
            relative_time: ctx.relative_time(fix.timestamp_ms),
            lat: fix.lat,
            lon: fix.lon,
            elevation: fix.altitude,
            speed: fix.speed,
            pressure: self.last_pressure,
            heart_rate: ctx.heart_rate,
            interval_triggered: ctx.take_pending_interval(),
        };
        self.samples.push(sample);
        Ingest::Recorded
    }
}

impl Modality for GpsModality {
    type Sample = GpsSample;

    fn recording_type(&self) -> RecordingType {
        RecordingType::Gps
    }

    fn on_stop(&mut self, _session: &Session, _now_ms: i64) {
        tracing::info!("Stop with {} samples", self.samples.len());
    }

    fn on_watchdog(&mut self, now_ms: i64) -> Option<WorkoutEvent> {
        let fix = self.last_fix?;
        let state = self.classify(&fix, now_ms);
        if state == self.gps_state {
            return None;
        }
        tracing::info!("GPS State: {:?} -> {:?}", self.gps_state, state);
        let old = std::mem::replace(&mut self.gps_state, state);
        Some(WorkoutEvent::GpsStateChanged { old, new: state })
    }

    fn auto_pause_possible(&self) -> bool {
        self.gps_state != GpsState::SignalLost
    }

    fn samples(&self) -> &[GpsSample] {
        &self.samples
    }

    fn ingest(&mut self, event: &SensorEvent, ctx: &mut IngestContext<'_>) -> Ingest {
        match event {
            SensorEvent::Location { fix } => self.ingest_fix(*fix, ctx),
            SensorEvent::Pressure { hpa, .. } => {
                self.last_pressure = Some(*hpa);
                Ingest::Ignored
            }
            _ => Ingest::Ignored,
        }
    }

    fn snapshot(&self) -> WorkoutSamples {
        WorkoutSamples::Gps(self.samples.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::{RecordingState, Session};

    fn fix_at(lat: f64, t: i64) -> GpsFix {
        GpsFix {
            lat,
            lon: 8.0,
            altitude: 100.0,
            speed: 3.0,
            accuracy: 5.0,
            timestamp_ms: t,
        }
    }

    fn running_session(start: i64) -> Session {
        let mut session = Session::new();
        session.begin(start);
        session.resume(start);
        session
    }

    #[test]
    fn test_spherical_distance_one_degree_latitude() {
        let d = spherical_distance(50.0, 8.0, 51.0, 8.0);
        assert!((d - 111_319.0).abs() < 200.0, "distance was {}", d);
    }

    #[test]
    fn test_close_fixes_are_dropped() {
        let mut gps = GpsModality::new(GpsParams::default());
        let mut session = running_session(0);

        let mut ctx = IngestContext::new(&mut session, 1_000, true, None);
        assert_eq!(gps.ingest_fix(fix_at(50.0, 1_000), &mut ctx), Ingest::Recorded);

        // ~1 m further: below min distance
        let mut ctx = IngestContext::new(&mut session, 2_000, true, None);
        assert_eq!(gps.ingest_fix(fix_at(50.00001, 2_000), &mut ctx), Ingest::Ignored);

        // far enough but only 200 ms later
        let mut ctx = IngestContext::new(&mut session, 1_200, true, None);
        assert_eq!(gps.ingest_fix(fix_at(50.001, 1_200), &mut ctx), Ingest::Ignored);

        let mut ctx = IngestContext::new(&mut session, 3_000, true, None);
        assert_eq!(gps.ingest_fix(fix_at(50.001, 3_000), &mut ctx), Ingest::Recorded);
        assert_eq!(gps.samples().len(), 2);
        assert!(gps.distance_m() > 100.0);
    }

    #[test]
    fn test_not_accepting_only_observes() {
        let mut gps = GpsModality::new(GpsParams::default());
        let mut session = running_session(0);
        session.state = RecordingState::Paused;
        let mut ctx = IngestContext::new(&mut session, 1_000, false, None);
        assert_eq!(gps.ingest_fix(fix_at(50.0, 1_000), &mut ctx), Ingest::Observed);
        assert!(gps.samples().is_empty());
    }

    #[test]
    fn test_pending_interval_lands_on_sample() {
        let mut gps = GpsModality::new(GpsParams::default());
        let mut session = running_session(0);
        session.last_triggered_interval = Some(7);
        let mut ctx = IngestContext::new(&mut session, 1_000, true, Some(140));
        gps.ingest_fix(fix_at(50.0, 1_000), &mut ctx);
        assert_eq!(gps.samples()[0].interval_triggered, Some(7));
        assert_eq!(gps.samples()[0].heart_rate, Some(140));
        assert_eq!(session.last_triggered_interval, None);
    }

    #[test]
    fn test_signal_classification_on_watchdog() {
        let mut gps = GpsModality::new(GpsParams::default());
        assert_eq!(gps.on_watchdog(0), None);

        gps.last_fix = Some(fix_at(50.0, 1_000));
        assert_eq!(
            gps.on_watchdog(2_000),
            Some(WorkoutEvent::GpsStateChanged {
                old: GpsState::SignalLost,
                new: GpsState::SignalGood
            })
        );
        assert!(gps.auto_pause_possible());
        assert_eq!(gps.on_watchdog(3_000), None);

        assert_eq!(
            gps.on_watchdog(11_001),
            Some(WorkoutEvent::GpsStateChanged {
                old: GpsState::SignalGood,
                new: GpsState::SignalLost
            })
        );
        assert!(!gps.auto_pause_possible());
    }

    #[test]
    fn test_bad_accuracy_is_signal_bad() {
        let mut gps = GpsModality::new(GpsParams::default());
        let mut fix = fix_at(50.0, 1_000);
        fix.accuracy = 45.0;
        gps.last_fix = Some(fix);
        assert_eq!(gps.classify(&fix, 1_500), GpsState::SignalBad);
    }

    fn track(relative_times: &[i64]) -> Vec<GpsSample> {
        relative_times
            .iter()
            .enumerate()
            .map(|(i, &t)| GpsSample {
                absolute_time: 1_000_000 + t,
                relative_time: t,
                lat: 50.0 + i as f64 * 0.001,
                lon: 8.0,
                elevation: 100.0,
                speed: 9.0,
                pressure: None,
                heart_rate: None,
                interval_triggered: None,
            })
            .collect()
    }

    fn step_m() -> f64 {
        spherical_distance(50.0, 8.0, 50.001, 8.0)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_restored_samples_recompute_distance() {
        let gps = GpsModality::with_samples(GpsParams::default(), track(&[0, 5_000, 10_000]));
        assert_close(gps.distance_m(), 2.0 * step_m());
    }

    #[test]
    fn test_avg_speed_and_pace_while_moving() {
        let gps = GpsModality::with_samples(
            GpsParams::default(),
            track(&[0, 5_000, 10_000, 15_000, 20_000]),
        );
        let speed = 4.0 * step_m() / 20.0;
        assert_close(gps.avg_speed(20_000), speed);
        assert_close(gps.avg_pace(20_000), 1000.0 / speed / 60.0);
    }

    #[test]
    fn test_current_speed_uses_last_fix_by_default() {
        let gps = GpsModality::with_samples(GpsParams::default(), track(&[0, 5_000, 10_000]));
        assert_eq!(gps.current_speed(10_000, 0), 9.0);
    }

    #[test]
    fn test_current_speed_averages_over_window() {
        let params = GpsParams {
            use_average_for_current_speed: true,
            current_speed_window_ms: 15_000,
            ..GpsParams::default()
        };
        let gps = GpsModality::with_samples(params, track(&[0, 5_000, 10_000, 15_000, 20_000]));

        // samples at 20 s, 15 s and 10 s are inside the window
        assert_close(gps.current_speed(20_000, 0), 2.0 * step_m() / 10.0);

        // the window does not reach back across the last resume
        let resumed_at = 1_000_000 + 15_000;
        assert_close(gps.windowed_speed(15_000, 20_000, resumed_at), step_m() / 5.0);
    }

    #[test]
    fn test_ascent_from_falling_pressure() {
        let mut gps = GpsModality::new(GpsParams::default());
        let mut session = running_session(0);
        let pressures = [1000.0, 999.0, 998.0, 997.0];
        for (i, hpa) in pressures.iter().enumerate() {
            let t = 1_000 * (i as i64 + 1);
            let mut ctx = IngestContext::new(&mut session, t, true, None);
            gps.ingest(
                &SensorEvent::Pressure {
                    hpa: *hpa,
                    timestamp_ms: t,
                },
                &mut ctx,
            );
            assert_eq!(
                gps.ingest_fix(fix_at(50.0 + i as f64 * 0.001, t), &mut ctx),
                Ingest::Recorded
            );
        }
        assert_eq!(gps.samples()[2].pressure, Some(998.0));

        let ascent = gps.ascent_m();
        let raw_gain = pressure_altitude(997.0) - pressure_altitude(1000.0);
        // smoothing lags behind the raw altitude
        assert!(ascent > 0.0 && ascent < raw_gain, "ascent was {}", ascent);
    }

    #[test]
    fn test_no_ascent_from_rising_pressure() {
        let mut samples = track(&[0, 1_000, 2_000]);
        for (sample, hpa) in samples.iter_mut().zip([997.0, 998.0, 999.0]) {
            sample.pressure = Some(hpa);
        }
        let gps = GpsModality::with_samples(GpsParams::default(), samples);
        assert_eq!(gps.ascent_m(), 0.0);
    }

    #[test]
    fn test_avg_pace_zero_without_movement() {
        let gps = GpsModality::new(GpsParams::default());
        assert_eq!(gps.avg_speed(60_000), 0.0);
        assert_eq!(gps.avg_pace(60_000), 0.0);
    }
}
