//! Recorder supervision
//!
//! A periodic loop that keeps the active recorder honest: auto-pause,
//! auto-resume, auto-timeout and per-tick components.

pub mod supervisor;

pub use supervisor::{
    RecorderSlot, TickOutcome, Watchdog, WatchdogComponent, WatchdogHandle, WATCHDOG_INTERVAL,
};
