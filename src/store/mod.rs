//! Persistence collaborators
//!
//! The recorder hands finished workouts to a [`WorkoutStore`] without
//! waiting for the result; failures are reported on the event bus.

pub mod bundle;
pub mod memory;
pub mod schema;

pub use bundle::JsonDirectoryStore;
pub use memory::MemoryStore;
pub use schema::{WorkoutRecord, WorkoutSamples, WorkoutSummary};

use crate::utils::StoreError;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait WorkoutStore: Send + Sync {
    /// Persist a workout, replacing an earlier version with the same id
    async fn save(&self, record: WorkoutRecord) -> Result<(), StoreError>;

    /// Drop a workout; unknown ids are ignored
    async fn discard(&self, id: Uuid) -> Result<(), StoreError>;

    async fn load(&self, id: Uuid) -> Result<WorkoutRecord, StoreError>;
}
