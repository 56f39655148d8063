//! Recording commands
//!
//! Thin entry points for a UI layer. Errors come back as [`ErrorResponse`].

use super::context::AppContext;
use crate::autostart::{AutoStartConfig, AutoStartState};
use crate::recorder::{Interval, RecordingState, RecordingType};
use crate::utils::ErrorResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of the current workout and auto-start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub workout_id: Option<Uuid>,
    pub recording_type: Option<RecordingType>,
    pub state: Option<RecordingState>,
    pub duration_ms: i64,
    pub pause_duration_ms: i64,
    pub heart_rate: Option<u32>,
    pub has_recorded_something: bool,
    pub is_saved: bool,
    pub auto_start_state: AutoStartState,
    pub countdown_ms: i64,
}

pub fn get_recording_status(ctx: &AppContext) -> RecordingStatus {
    let sequencer = ctx.sequencer();
    let mut status = RecordingStatus {
        workout_id: None,
        recording_type: None,
        state: None,
        duration_ms: 0,
        pause_duration_ms: 0,
        heart_rate: None,
        has_recorded_something: false,
        is_saved: false,
        auto_start_state: sequencer.state(),
        countdown_ms: sequencer.countdown_ms(),
    };
    if let Some(recorder) = ctx.recorder() {
        status.workout_id = Some(recorder.id());
        status.recording_type = Some(recorder.recording_type());
        status.state = Some(recorder.state());
        status.duration_ms = recorder.duration_ms();
        status.pause_duration_ms = recorder.pause_duration_ms();
        status.heart_rate = recorder.current_heart_rate();
        status.has_recorded_something = recorder.has_recorded_something();
        status.is_saved = recorder.is_saved();
    }
    status
}

pub fn get_recording_state(ctx: &AppContext) -> Option<RecordingState> {
    ctx.recorder().map(|recorder| recorder.state())
}

pub fn get_recording_duration(ctx: &AppContext) -> i64 {
    ctx.recorder().map_or(0, |recorder| recorder.duration_ms())
}

pub fn start_recording(ctx: &AppContext) -> Result<(), ErrorResponse> {
    ctx.start_workout().map_err(Into::into)
}

pub fn pause_recording(ctx: &AppContext) -> Result<(), ErrorResponse> {
    ctx.pause_workout().map_err(Into::into)
}

pub fn resume_recording(ctx: &AppContext) -> Result<(), ErrorResponse> {
    ctx.resume_workout().map_err(Into::into)
}

pub fn stop_recording(ctx: &AppContext, save: bool) -> Result<(), ErrorResponse> {
    ctx.stop_workout(save).map_err(Into::into)
}

pub fn discard_recording(ctx: &AppContext) -> Result<(), ErrorResponse> {
    ctx.discard_workout().map_err(Into::into)
}

pub fn set_intervals(
    ctx: &AppContext,
    intervals: Vec<Interval>,
    interval_set_id: Option<i64>,
) -> Result<(), ErrorResponse> {
    ctx.set_intervals(intervals, interval_set_id)
        .map_err(Into::into)
}

pub fn set_comment(ctx: &AppContext, comment: String) -> Result<(), ErrorResponse> {
    ctx.set_comment(comment).map_err(Into::into)
}

pub async fn restore_recording(
    ctx: &AppContext,
    id: Uuid,
    gps_min_distance_m: f64,
    min_repetitions: u32,
) -> Result<RecordingStatus, ErrorResponse> {
    ctx.restore_workout(id, gps_min_distance_m, min_repetitions)
        .await
        .map_err(ErrorResponse::from)?;
    Ok(get_recording_status(ctx))
}

pub fn begin_auto_start(
    ctx: &AppContext,
    config: Option<AutoStartConfig>,
) -> Result<(), ErrorResponse> {
    ctx.begin_auto_start(config).map_err(Into::into)
}

pub fn abort_auto_start(ctx: &AppContext) {
    ctx.abort_auto_start();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::context::ContextOptions;

    #[tokio::test(start_paused = true)]
    async fn test_status_without_recorder() {
        let ctx = AppContext::start(ContextOptions::default()).await;
        let status = get_recording_status(&ctx);
        assert_eq!(status.state, None);
        assert_eq!(status.auto_start_state, AutoStartState::Idle);
        assert_eq!(get_recording_duration(&ctx), 0);

        let err = start_recording(&ctx).unwrap_err();
        assert_eq!(err.code, "RECORDING_ERROR");
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_from_idle_is_rejected() {
        let ctx = AppContext::start(ContextOptions::default()).await;
        ctx.new_indoor_workout("treadmill", 1);
        let err = resume_recording(&ctx).unwrap_err();
        assert_eq!(err.code, "RECORDING_ERROR");

        start_recording(&ctx).unwrap();
        pause_recording(&ctx).unwrap();
        assert_eq!(get_recording_state(&ctx), Some(RecordingState::Paused));
        resume_recording(&ctx).unwrap();
        assert_eq!(get_recording_state(&ctx), Some(RecordingState::Running));
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_unknown_workout() {
        let ctx = AppContext::start(ContextOptions::default()).await;
        let err = restore_recording(&ctx, Uuid::new_v4(), 5.0, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code, "PERSISTENCE_ERROR");
        ctx.shutdown().await;
    }
}
