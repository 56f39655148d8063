//! Event module
//!
//! Typed sensor input and lifecycle output, plus the broadcast bus that
//! fans lifecycle events out to UI, persistence and feedback consumers.

pub mod bus;
pub mod types;

pub use bus::{drain, EventBus};
pub use types::{
    ConnectionState, CountdownTick, DetectionState, GpsFix, SensorEvent, WorkoutEvent,
};
