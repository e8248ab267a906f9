// ── Device state cache ──
//
// Last-known attribute values per topic, stamped with observation time.
// Reads never block on the network and never trigger traffic; the dispatch
// loop is the only writer for live updates. Entries survive unsubscription
// and are only discarded with the session itself.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hublink_api::{AttributeValue, TopicId};

/// One cached attribute: the value and when it was last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub value: AttributeValue,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct StateCache {
    topics: DashMap<TopicId, DashMap<String, Attribute>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for an attribute, or `None` if never observed.
    pub fn get(&self, topic: &TopicId, attribute: &str) -> Option<Attribute> {
        self.topics.get(topic)?.get(attribute).map(|a| a.clone())
    }

    /// Snapshot of every known attribute for a topic.
    pub fn attributes(&self, topic: &TopicId) -> Vec<(String, Attribute)> {
        self.topics
            .get(topic)
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overwrite an attribute with a newly observed value, stamping it now.
    pub(crate) fn apply(&self, topic: &TopicId, attribute: &str, value: AttributeValue) -> Attribute {
        let stored = Attribute {
            value,
            updated_at: Utc::now(),
        };
        self.topics
            .entry(topic.clone())
            .or_default()
            .insert(attribute.to_owned(), stored.clone());
        stored
    }

    /// Bulk-load initial attribute states, e.g. from a directory record.
    pub(crate) fn seed(
        &self,
        topic: &TopicId,
        attributes: impl IntoIterator<Item = (String, AttributeValue)>,
    ) {
        let entry = self.topics.entry(topic.clone()).or_default();
        for (name, value) in attributes {
            entry.insert(
                name,
                Attribute {
                    value,
                    updated_at: Utc::now(),
                },
            );
        }
    }
}
