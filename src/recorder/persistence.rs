//! Store writer
//!
//! Every store call of a recorder goes through one queue drained by a single
//! task, so checkpoints, the final save and a discard reach the store in the
//! order they were issued. Operations carry a sequence number taken under the
//! recorder lock; anything older than what was already written is dropped.

use crate::events::{EventBus, WorkoutEvent};
use crate::store::{WorkoutRecord, WorkoutStore};
use crate::utils::RecorderError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug)]
pub(crate) enum StoreOp {
    /// Snapshot of an unfinished workout, for crash recovery
    Checkpoint(WorkoutRecord),
    /// The finished workout
    Save(WorkoutRecord),
    Discard(Uuid),
}

#[derive(Debug)]
struct Stamped {
    seq: u64,
    op: StoreOp,
}

pub(crate) struct StoreWriter {
    store: Arc<dyn WorkoutStore>,
    events: EventBus,
    saved: Arc<AtomicBool>,
    tx: Mutex<Option<mpsc::UnboundedSender<Stamped>>>,
}

impl StoreWriter {
    pub(crate) fn new(store: Arc<dyn WorkoutStore>, events: EventBus, saved: Arc<AtomicBool>) -> Self {
        Self {
            store,
            events,
            saved,
            tx: Mutex::new(None),
        }
    }

    /// Queue `op`; the writer task is spawned on first use
    pub(crate) fn submit(&self, seq: u64, op: StoreOp) -> Result<(), RecorderError> {
        let mut tx = self.tx.lock();
        let mut item = Stamped { seq, op };
        if let Some(sender) = tx.as_ref() {
            match sender.send(item) {
                Ok(()) => return Ok(()),
                // writer task is gone, e.g. its runtime shut down
                Err(mpsc::error::SendError(back)) => item = back,
            }
        }

        let handle = Handle::try_current().map_err(|_| RecorderError::PersistenceUnavailable)?;
        let (sender, rx) = mpsc::unbounded_channel();
        handle.spawn(run(
            rx,
            self.store.clone(),
            self.events.clone(),
            self.saved.clone(),
        ));
        if sender.send(item).is_err() {
            return Err(RecorderError::PersistenceUnavailable);
        }
        *tx = Some(sender);
        Ok(())
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Stamped>,
    store: Arc<dyn WorkoutStore>,
    events: EventBus,
    saved: Arc<AtomicBool>,
) {
    let mut last_seq = 0;
    while let Some(Stamped { seq, op }) = rx.recv().await {
        if seq <= last_seq {
            tracing::debug!("Dropping stale store operation #{}", seq);
            continue;
        }
        last_seq = seq;

        match op {
            StoreOp::Checkpoint(record) => {
                let id = record.id();
                match store.save(record).await {
                    Ok(()) => tracing::debug!("Checkpointed workout {}", id),
                    Err(e) => tracing::warn!("Failed to checkpoint workout {}: {}", id, e),
                }
            }
            StoreOp::Save(record) => {
                let id = record.id();
                match store.save(record).await {
                    Ok(()) => tracing::info!("Workout {} saved", id),
                    Err(e) => {
                        tracing::error!("Failed to save workout {}: {}", id, e);
                        saved.store(false, Ordering::SeqCst);
                        events.publish(WorkoutEvent::PersistenceFailed {
                            workout_id: id,
                            message: e.to_string(),
                        });
                    }
                }
            }
            StoreOp::Discard(id) => {
                if let Err(e) = store.discard(id).await {
                    tracing::error!("Failed to discard workout {}: {}", id, e);
                    events.publish(WorkoutEvent::PersistenceFailed {
                        workout_id: id,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
