//! Workout Recorder - records GPS and indoor workouts.
//!
//! Tracks the lifecycle of one workout at a time, turns sensor events into
//! samples, supervises the running workout from a watchdog loop and runs the
//! auto-start countdown with its announcements.

pub mod announcements;
pub mod autostart;
pub mod commands;
pub mod events;
pub mod recorder;
pub mod settings;
pub mod store;
pub mod utils;
pub mod watchdog;

pub use commands::{AppContext, ContextOptions};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workout_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Workout Recorder v{}", env!("CARGO_PKG_VERSION"));
}
