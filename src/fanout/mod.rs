use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::domain::order::{OrderUpdate, Topic};
use crate::metrics::Metrics;

// ============================================================================
// Fan-out Hub - Per-topic publish/subscribe for lifecycle events
// ============================================================================
//
// A connection joins any number of topics (an order id, or `all`) and
// receives every event published to them until it leaves or is dropped.
//
// Delivery is at-most-once: nothing is buffered for absent subscribers and
// nothing is replayed. Each connection has its own unbounded queue, so a slow
// reader never blocks the publisher or other readers.
//
// ============================================================================

/// An event as seen by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: Topic,
    pub event: OrderUpdate,
}

/// Anything that can take lifecycle events.
pub trait EventPublisher: Send + Sync {
    /// Returns how many connections received the event.
    fn publish(&self, topic: Topic, event: OrderUpdate) -> usize;
}

type ConnectionId = u64;

#[derive(Default)]
struct Registry {
    next_id: ConnectionId,
    members: HashMap<Topic, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<Delivery>>,
}

impl Registry {
    fn disconnect(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
        self.members.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
    }
}

#[derive(Clone, Default)]
pub struct FanoutHub {
    registry: Arc<Mutex<Registry>>,
    metrics: Option<Arc<Metrics>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Poisoning is ignored: every registry update is a single map operation.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            registry: Arc::default(),
            metrics: Some(metrics),
        }
    }

    /// Open a new connection with no topics joined.
    pub fn connect(&self) -> Subscriber {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.connections.insert(id, tx);
        Subscriber {
            id,
            registry: self.registry.clone(),
            inbox: rx,
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        lock(&self.registry).members.get(topic).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.registry).connections.len()
    }
}

impl EventPublisher for FanoutHub {
    fn publish(&self, topic: Topic, event: OrderUpdate) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        {
            let mut registry = lock(&self.registry);
            let Registry {
                members,
                connections,
                ..
            } = &mut *registry;

            if let Some(ids) = members.get_mut(&topic) {
                ids.retain(|id| match connections.get(id) {
                    Some(tx) => {
                        let sent = tx
                            .send(Delivery {
                                topic,
                                event: event.clone(),
                            })
                            .is_ok();
                        delivered += usize::from(sent);
                        sent
                    }
                    None => false,
                });
            }
        }

        if delivered == 0 {
            tracing::debug!(topic = %topic, kind, "No subscribers, event dropped");
        } else {
            tracing::debug!(topic = %topic, kind, delivered, "Event fanned out");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_fanout(kind, delivered);
        }
        delivered
    }
}

/// One client connection. Dropping it leaves every joined topic.
pub struct Subscriber {
    id: ConnectionId,
    registry: Arc<Mutex<Registry>>,
    inbox: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscriber {
    pub fn join(&self, topic: Topic) {
        lock(&self.registry).members.entry(topic).or_default().insert(self.id);
    }

    pub fn leave(&self, topic: &Topic) {
        let mut registry = lock(&self.registry);
        if let Some(ids) = registry.members.get_mut(topic) {
            ids.remove(&self.id);
            if ids.is_empty() {
                registry.members.remove(topic);
            }
        }
    }

    pub fn topics(&self) -> Vec<Topic> {
        lock(&self.registry)
            .members
            .iter()
            .filter(|(_, ids)| ids.contains(&self.id))
            .map(|(topic, _)| *topic)
            .collect()
    }

    /// Wait for the next event on any joined topic.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.inbox.recv().await
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.inbox.try_recv().ok()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        lock(&self.registry).disconnect(self.id);
    }
}
