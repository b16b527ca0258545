//! Event broadcaster.
//!
//! Keeps the live set of push-channel subscribers. Each subscriber owns an
//! unbounded channel so `publish` never waits on a slow client. A send that
//! fails means the receiving side is gone, and that subscriber is pruned.
//!
//! The hub is created at server start and `close`d at shutdown, which drops
//! every sender so each subscriber loop sees its channel end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::models::BroadcastEvent;

pub type SharedEvent = Arc<BroadcastEvent>;

#[derive(Default)]
struct Registry {
    subscribers: HashMap<u64, mpsc::UnboundedSender<SharedEvent>>,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A panic while holding the lock cannot leave the map half-updated
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Join the live set. Events published from now on are delivered to the
    /// returned subscription until it is dropped.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut registry = self.registry();
        if !registry.closed {
            registry.subscribers.insert(id, tx);
        }
        let live = registry.subscribers.len();
        drop(registry);

        tracing::info!(subscriber = id, live, "Subscriber connected");
        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut registry = self.registry();
        if registry.subscribers.remove(&id).is_some() {
            let live = registry.subscribers.len();
            drop(registry);
            tracing::info!(subscriber = id, live, "Subscriber disconnected");
        }
    }

    /// Deliver `event` to every current subscriber. Returns how many
    /// subscribers it reached.
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        let kind = event.kind();
        let event = Arc::new(event);

        let mut registry = self.registry();
        registry
            .subscribers
            .retain(|id, tx| match tx.send(Arc::clone(&event)) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(subscriber = *id, "Pruning closed subscriber");
                    false
                }
            });
        let delivered = registry.subscribers.len();
        drop(registry);

        tracing::debug!(event = kind, delivered, "Published event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Tear down the live set; later subscriptions start closed.
    pub fn close(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        let dropped = registry.subscribers.len();
        registry.subscribers.clear();
        drop(registry);
        tracing::info!(dropped, "Event hub closed");
    }
}

/// A live subscriber's receiving end. Dropping it leaves the live set.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SharedEvent>,
    hub: EventHub,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the hub is closed.
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<SharedEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deleted(path: &str) -> BroadcastEvent {
        BroadcastEvent::FileDeleted {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_fan_out_preserves_order() {
        let hub = EventHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish(deleted("1")), 2);
        assert_eq!(hub.publish(deleted("2")), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(*sub.try_recv().unwrap(), deleted("1"));
            assert_eq!(*sub.try_recv().unwrap(), deleted("2"));
            assert!(sub.try_recv().is_none());
        }
    }

    #[test]
    fn test_late_subscriber_gets_no_backlog() {
        let hub = EventHub::new();
        hub.publish(deleted("before"));

        let mut late = hub.subscribe();
        assert!(late.try_recv().is_none());

        hub.publish(deleted("after"));
        assert_eq!(*late.try_recv().unwrap(), deleted("after"));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        let _other = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(sub);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.publish(deleted("x")), 1);
    }

    #[test]
    fn test_publish_with_no_subscribers_is_fine() {
        let hub = EventHub::new();
        assert_eq!(hub.publish(deleted("x")), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        hub.close();

        assert!(sub.recv().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);

        let mut after = hub.subscribe();
        assert!(after.recv().await.is_none());
    }
}
