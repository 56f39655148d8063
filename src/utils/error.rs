//! Error types and handling
//!
//! Common error types used across the recorder core.

use crate::recorder::{RecordingState, RecordingType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the recording state machine.
///
/// These are caller bugs: an operation was requested from a state that
/// does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Cannot {operation} recording, state = {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RecordingState,
    },

    #[error("No recorder attached")]
    NoRecorder,

    #[error("Cannot restore {found:?} samples into a {expected:?} recorder")]
    TypeMismatch {
        expected: RecordingType,
        found: RecordingType,
    },

    #[error("No async runtime available for persistence")]
    PersistenceUnavailable,
}

impl RecorderError {
    pub(crate) fn invalid(operation: &'static str, state: RecordingState) -> Self {
        Self::InvalidState { operation, state }
    }
}

/// Errors raised by the auto-start sequencer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutoStartError {
    #[error("No async runtime available for auto-start timers")]
    NoRuntime,
}

/// Errors raised by persistence collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workout not found: {0}")]
    NotFound(String),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recording error: {0}")]
    Recording(#[from] RecorderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Auto-start error: {0}")]
    AutoStart(#[from] AutoStartError),
}

/// Error response for the UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::AutoStart(_) => "AUTO_START_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_error_maps_to_recording_code() {
        let err = AppError::from(RecorderError::invalid("start", RecordingState::Stopped));
        let response = ErrorResponse::from(err);
        assert_eq!(response.code, "RECORDING_ERROR");
        assert!(response.message.contains("Stopped"));
    }

    #[test]
    fn test_store_error_maps_to_persistence_code() {
        let err = AppError::from(StoreError::NotFound("abc".to_string()));
        let response = ErrorResponse::from(err);
        assert_eq!(response.code, "PERSISTENCE_ERROR");
    }
}
