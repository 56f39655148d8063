//! Settings
//!
//! User preferences that shape recording and auto-start behaviour.

pub mod preferences;

pub use preferences::UserPreferences;
