//! Command handlers
//!
//! [`AppContext`] owns the running system; the functions in [`recording`]
//! are what a UI layer calls into.

pub mod context;
pub mod recording;

pub use context::{AppContext, ContextOptions};
