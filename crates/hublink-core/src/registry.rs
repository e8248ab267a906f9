// ── Subscription registry ──
//
// Refcounted interest per topic. The hub is told about a topic exactly
// once while anyone cares (first listener triggers the subscribe frame,
// last removal triggers the unsubscribe), and events are only fanned out
// after the hub has acknowledged the subscription. The state cache is
// written regardless of delivery; gating applies to listeners only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hublink_api::{AttributeValue, TopicId};
use tokio::sync::mpsc;
use tracing::trace;

/// An unsolicited attribute change, delivered after the cache was updated.
///
/// Reading the attribute back from the cache at delivery time therefore
/// returns this value or a newer one, never an older one.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub topic: TopicId,
    pub attribute: String,
    pub value: AttributeValue,
    pub observed_at: DateTime<Utc>,
}

pub type UpdateReceiver = mpsc::UnboundedReceiver<Arc<UpdateEvent>>;

/// Identifies one listener registration; required to unsubscribe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: TopicId,
    listener_id: u64,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &TopicId {
        &self.topic
    }
}

/// Hub-side lifecycle of a topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe frame sent, acknowledgment pending. Events are cached but
    /// not delivered.
    Subscribing,
    /// Hub acknowledged; events flow to listeners.
    Subscribed,
}

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<Arc<UpdateEvent>>,
}

struct TopicEntry {
    state: SubscriptionState,
    listeners: Vec<Listener>,
}

pub(crate) struct SubscriptionRegistry {
    topics: DashMap<TopicId, TopicEntry>,
    next_listener_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Register interest in a topic. The `bool` is `true` when this is the
    /// topic's first listener and the hub must be told.
    pub fn subscribe(&self, topic: &TopicId) -> (SubscriptionHandle, UpdateReceiver, bool) {
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut entry = self.topics.entry(topic.clone()).or_insert_with(|| TopicEntry {
            state: SubscriptionState::Subscribing,
            listeners: Vec::new(),
        });
        let first = entry.listeners.is_empty();
        entry.listeners.push(Listener { id: listener_id, tx });

        (
            SubscriptionHandle {
                topic: topic.clone(),
                listener_id,
            },
            rx,
            first,
        )
    }

    /// Remove one listener. Returns `true` when the topic just lost its
    /// last listener; `on_last` runs in that case, while the topic entry
    /// is still locked, so a concurrent `subscribe` on the same topic
    /// cannot slip between the refcount decision and the hub frame the
    /// caller sends from the closure.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle, on_last: impl FnOnce()) -> bool {
        match self.topics.entry(handle.topic.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied
                    .get_mut()
                    .listeners
                    .retain(|l| l.id != handle.listener_id);
                if occupied.get().listeners.is_empty() {
                    on_last();
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Flip a topic to `Subscribed` on acknowledgment. Returns `false` for
    /// topics nobody is subscribed to.
    pub fn mark_subscribed(&self, topic: &TopicId) -> bool {
        match self.topics.get_mut(topic) {
            Some(mut entry) => {
                entry.state = SubscriptionState::Subscribed;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn state(&self, topic: &TopicId) -> Option<SubscriptionState> {
        self.topics.get(topic).map(|e| e.state)
    }

    /// Fan an event out to the topic's listeners, pruning any whose
    /// receiver is gone. Returns `true` when pruning emptied the topic;
    /// `on_emptied` runs under the same entry lock as `unsubscribe`'s
    /// `on_last`, with the same interleaving guarantee.
    pub fn deliver(&self, event: &Arc<UpdateEvent>, on_emptied: impl FnOnce()) -> bool {
        match self.topics.entry(event.topic.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().state != SubscriptionState::Subscribed {
                    trace!(topic = %event.topic, "holding delivery until subscribe ack");
                    return false;
                }

                occupied
                    .get_mut()
                    .listeners
                    .retain(|l| l.tx.send(Arc::clone(event)).is_ok());
                if occupied.get().listeners.is_empty() {
                    on_emptied();
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }
}
