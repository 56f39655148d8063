//! Workout event bus
//!
//! A single broadcast channel carries every lifecycle event, so subscribers
//! observe events in the order each publisher emitted them.

use super::types::WorkoutEvent;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Cloneable publisher handle for [`WorkoutEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkoutEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: WorkoutEvent) {
        tracing::trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<WorkoutEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain every event currently queued on a receiver.
pub fn drain(rx: &mut broadcast::Receiver<WorkoutEvent>) -> Vec<WorkoutEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!("Event receiver lagged, skipped {} events", skipped);
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish(WorkoutEvent::IntervalTriggered { interval_id: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for id in 0..5 {
            bus.publish(WorkoutEvent::IntervalTriggered { interval_id: id });
        }
        let ids: Vec<i64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                WorkoutEvent::IntervalTriggered { interval_id } => Some(interval_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
