//! Shared utilities: errors and time sources.

pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use error::{
    AppError, AppResult, AutoStartError, ErrorResponse, RecorderError, StoreError,
};
