use super::codec::EventKind;
use super::connection::{ConnectionHandle, ConnectionId};
use crate::db::PollId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Routing key of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    pub kind: EventKind,
    pub poll_id: PollId,
}

impl Topic {
    pub fn new(kind: EventKind, poll_id: PollId) -> Self {
        Self { kind, poll_id }
    }
}

#[derive(Default)]
struct Inner {
    /// Subscribers per topic, in subscription order.
    by_topic: HashMap<Topic, Vec<ConnectionHandle>>,
    /// Reverse index used to tear a connection down without scanning every topic.
    by_connection: HashMap<ConnectionId, Vec<Topic>>,
}

/// The set of active `(connection, kind, poll)` subscriptions.
///
/// One mutex serializes every operation. It is never held across an `.await`,
/// and [`matching`](Self::matching) hands out a snapshot so callers can fan out
/// while other connections keep subscribing or leaving.
#[derive(Default)]
pub struct SubscriptionTable {
    inner: Mutex<Inner>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the subscription already existed.
    pub fn add(&self, connection: &ConnectionHandle, topic: Topic) -> bool {
        let mut inner = self.inner.lock();
        let id = connection.id();

        let subscribers = inner.by_topic.entry(topic).or_default();
        if subscribers.iter().any(|c| c.id() == id) {
            return false;
        }
        subscribers.push(connection.clone());
        inner.by_connection.entry(id).or_default().push(topic);
        true
    }

    /// Returns `false` if there was nothing to remove.
    pub fn remove(&self, connection: ConnectionId, topic: Topic) -> bool {
        let mut inner = self.inner.lock();

        let Some(subscribers) = inner.by_topic.get_mut(&topic) else {
            return false;
        };
        let Some(index) = subscribers.iter().position(|c| c.id() == connection) else {
            return false;
        };
        subscribers.remove(index);
        if subscribers.is_empty() {
            inner.by_topic.remove(&topic);
        }

        if let Some(topics) = inner.by_connection.get_mut(&connection) {
            topics.retain(|t| *t != topic);
            if topics.is_empty() {
                inner.by_connection.remove(&connection);
            }
        }
        true
    }

    /// Drops every subscription held by `connection`, returning how many there were.
    pub fn remove_all(&self, connection: ConnectionId) -> usize {
        let mut inner = self.inner.lock();

        let Some(topics) = inner.by_connection.remove(&connection) else {
            return 0;
        };
        for topic in &topics {
            if let Some(subscribers) = inner.by_topic.get_mut(topic) {
                subscribers.retain(|c| c.id() != connection);
                if subscribers.is_empty() {
                    inner.by_topic.remove(topic);
                }
            }
        }
        topics.len()
    }

    pub fn matching(&self, topic: Topic) -> Vec<ConnectionHandle> {
        self.inner
            .lock()
            .by_topic
            .get(&topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_topic.clear();
        inner.by_connection.clear();
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().by_connection.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_connection.is_empty()
    }
}
