//! Workout bundle read/write operations
//!
//! Stores each workout as `<id>.json` inside a directory. File IO runs on
//! the blocking pool so the recorder never waits on disk.

use super::schema::WorkoutRecord;
use super::WorkoutStore;
use crate::utils::StoreError;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One JSON file per workout
#[derive(Debug, Clone)]
pub struct JsonDirectoryStore {
    root: PathBuf,
}

impl JsonDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }
}

/// Write a record to `path`, replacing any previous version
pub fn write_record(path: &Path, record: &WorkoutRecord) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;

    tracing::debug!("Saved workout {} to {:?}", record.id(), path);
    Ok(())
}

/// Read a record from `path`
pub fn read_record(path: &Path) -> Result<WorkoutRecord, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let record: WorkoutRecord = serde_json::from_str(&content)?;
    Ok(record)
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[async_trait]
impl WorkoutStore for JsonDirectoryStore {
    async fn save(&self, record: WorkoutRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.id());
        blocking(move || write_record(&path, &record)).await
    }

    async fn discard(&self, id: Uuid) -> Result<(), StoreError> {
        let path = self.path_for(id);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn load(&self, id: Uuid) -> Result<WorkoutRecord, StoreError> {
        let path = self.path_for(id);
        blocking(move || read_record(&path)).await
    }
}
