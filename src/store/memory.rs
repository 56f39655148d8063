//! In-memory workout store

use super::schema::WorkoutRecord;
use super::WorkoutStore;
use crate::utils::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, WorkoutRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<WorkoutRecord> {
        self.records.lock().get(&id).cloned()
    }
}

#[async_trait]
impl WorkoutStore for MemoryStore {
    async fn save(&self, record: WorkoutRecord) -> Result<(), StoreError> {
        self.records.lock().insert(record.id(), record);
        Ok(())
    }

    async fn discard(&self, id: Uuid) -> Result<(), StoreError> {
        self.records.lock().remove(&id);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<WorkoutRecord, StoreError> {
        self.get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
