use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::BookingEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Boundary to the external notification collaborator.
///
/// Calls are fire-and-forget from the engine's perspective: an
/// implementation must not block, and a failed delivery never rolls back or
/// fails the booking mutation that triggered it. The engine always emits
/// after releasing the per-tutor lock.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &BookingEvent);
}

/// In-process sink: one broadcast channel per tutor. Subscribers that lag or
/// disconnect simply miss events; nothing propagates back to the engine.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<BookingEvent>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to lifecycle events for a tutor. Creates the channel if needed.
    pub fn subscribe(&self, tutor_id: Ulid) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .channels
            .entry(tutor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Drop a tutor's channel.
    pub fn remove(&self, tutor_id: &Ulid) {
        self.channels.remove(tutor_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for NotifyHub {
    /// Send a notification. No-op if nobody is listening.
    fn emit(&self, event: &BookingEvent) {
        if let Some(sender) = self.channels.get(&event.tutor_id()) {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let tutor_id = Ulid::new();
        let mut rx = hub.subscribe(tutor_id);

        let event = BookingEvent::Accepted {
            id: Ulid::new(),
            tutor_id,
            note: None,
            at: Utc::now(),
        };
        hub.emit(&event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — must not panic or block
        hub.emit(&BookingEvent::Expired {
            id: Ulid::new(),
            tutor_id: Ulid::new(),
            at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn channels_are_per_tutor() {
        let hub = NotifyHub::new();
        let tutor_a = Ulid::new();
        let tutor_b = Ulid::new();
        let mut rx_a = hub.subscribe(tutor_a);
        let _rx_b = hub.subscribe(tutor_b);

        hub.emit(&BookingEvent::Completed {
            id: Ulid::new(),
            tutor_id: tutor_b,
            at: Utc::now(),
        });

        assert!(rx_a.try_recv().is_err());
    }
}
