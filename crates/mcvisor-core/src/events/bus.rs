//! In-process publish/subscribe for server events.
//!
//! Each subscriber gets its own unbounded inbox, so a slow subscriber never
//! loses events and never holds up the tracker. Delivery order per
//! subscriber is publish order. Dropping a [`Subscription`] unsubscribes;
//! closed inboxes are pruned on the next publish.

use super::{ServerEvent, Topic};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    /// `None` receives every event.
    topic: Option<Topic>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Subscriber {
    fn wants(&self, topic: &Topic) -> bool {
        self.topic.as_ref().is_none_or(|t| t == topic)
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: Vec<Subscriber>,
    closed: bool,
}

/// Event bus for one supervised server.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    /// Create a new bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one channel.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.add(Some(topic))
    }

    /// Subscribe to every channel.
    pub fn subscribe_all(&self) -> Subscription {
        self.add(None)
    }

    fn add(&self, topic: Option<Topic>) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        // After close the sender is dropped here and the subscription ends at once.
        if !inner.closed {
            inner.subscribers.push(Subscriber { topic, sender });
        }
        Subscription { receiver }
    }

    /// Deliver an event to every matching subscriber.
    pub fn publish(&self, event: ServerEvent) {
        let topic = event.topic();
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| !s.sender.is_closed());
        for subscriber in inner.subscribers.iter().filter(|s| s.wants(&topic)) {
            let _ = subscriber.sender.send(event.clone());
        }
    }

    /// End every subscription. Later subscriptions end immediately.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            debug!(subscribers = inner.subscribers.len(), "Closing event bus");
            inner.closed = true;
            inner.subscribers.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Get number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| !s.sender.is_closed());
        inner.subscribers.len()
    }
}

/// Receiving end of a bus subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.receiver.try_recv().ok()
    }
}
