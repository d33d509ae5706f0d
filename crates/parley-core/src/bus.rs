//! Realtime event bus: fan-out of domain events to subscribed sessions.
//!
//! Built on `tokio::sync::broadcast`. The bus is an explicit object handed
//! to each component — there is no process-global channel registry.
//! Subscribing returns an [`EventSubscription`] handle used for explicit
//! unsubscription; dropping the handle unsubscribes too.
//!
//! Delivery contract: at-least-once, unordered across event kinds.
//! Publishers of one conversation's `MessageEvent`s publish in creation
//! order (inside the store critical section), and the channel preserves
//! publication order per subscriber. A subscriber that falls behind the
//! channel capacity observes [`RecvError::Lagged`] and must resynchronize
//! from the store; duplicates are possible and handlers must be
//! idempotent.
//!
//! [`RecvError::Lagged`]: tokio::sync::broadcast::error::RecvError::Lagged

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

use parley_shared::{EventEnvelope, EventPayload};

/// Fan-out bus for domain events. Cheap to clone; all clones share the
/// same channel and subscriber registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    tx: broadcast::Sender<EventEnvelope>,
    // Lock covers the subscriber id set only, never event payloads.
    subscribers: RwLock<HashSet<Uuid>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(BusInner {
                tx,
                subscribers: RwLock::new(HashSet::new()),
            }),
        }
    }

    /// Register a new subscriber session.
    pub fn subscribe(&self) -> EventSubscription {
        let id = Uuid::new_v4();
        self.inner
            .subscribers
            .write()
            .expect("subscriber registry poisoned")
            .insert(id);
        tracing::debug!(subscriber = %id, "event bus subscription opened");

        EventSubscription {
            id,
            receiver: self.inner.tx.subscribe(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Publish an event to every live subscriber. Fire-and-forget: the
    /// publisher never waits on subscriber processing, and a bus with no
    /// subscribers swallows the event.
    pub fn publish(&self, payload: EventPayload) {
        let envelope = EventEnvelope::new(payload);
        let delivered = self.inner.tx.send(envelope).unwrap_or(0);
        tracing::debug!(subscribers = delivered, "event published");
    }

    /// Number of currently registered subscriber sessions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .expect("subscriber registry poisoned")
            .len()
    }
}

/// Handle to one subscriber session's event stream. Unsubscribes on drop
/// or via [`EventSubscription::unsubscribe`].
pub struct EventSubscription {
    id: Uuid,
    receiver: broadcast::Receiver<EventEnvelope>,
    inner: Arc<BusInner>,
}

impl EventSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Await the next event. Returns `Err(RecvError::Lagged(n))` if this
    /// subscriber fell behind by `n` events; the session should then do a
    /// full refetch from the store.
    pub async fn recv(&mut self) -> Result<EventEnvelope, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`EventSubscription::recv`].
    pub fn try_recv(&mut self) -> Result<EventEnvelope, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Explicitly end the subscription.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.inner
            .subscribers
            .write()
            .expect("subscriber registry poisoned")
            .remove(&self.id);
        tracing::debug!(subscriber = %self.id, "event bus subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::{PresenceStatus, UserId};

    fn presence_event(user_id: UserId) -> EventPayload {
        EventPayload::PresenceChanged {
            user_id,
            status: PresenceStatus::Online,
            last_seen: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let user_id = UserId::new();
        bus.publish(presence_event(user_id));

        for subscription in [&mut first, &mut second] {
            let envelope = subscription.recv().await.unwrap();
            match envelope.payload {
                EventPayload::PresenceChanged { user_id: got, .. } => assert_eq!(got, user_id),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn events_arrive_in_publication_order() {
        let bus = EventBus::new(16);
        let mut subscription = bus.subscribe();

        let (a, b) = (UserId::new(), UserId::new());
        bus.publish(presence_event(a));
        bus.publish(presence_event(b));

        let order: Vec<UserId> = [
            subscription.recv().await.unwrap(),
            subscription.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|envelope| match envelope.payload {
            EventPayload::PresenceChanged { user_id, .. } => user_id,
            other => panic!("unexpected event: {other:?}"),
        })
        .collect();

        assert_eq!(order, [a, b]);
    }

    #[tokio::test]
    async fn unsubscribe_shrinks_the_registry() {
        let bus = EventBus::new(16);
        let first = bus.subscribe();
        let second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        first.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(second);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(16);
        bus.publish(presence_event(UserId::new()));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
