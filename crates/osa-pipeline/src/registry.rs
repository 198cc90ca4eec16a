//! Subscription registry: event type → consumer groups.
//!
//! Built once at process start from the handler list. The outbox consults it
//! during `append` to decide how many delivery rows to write.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::handler::EventHandler;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    by_type: BTreeMap<String, BTreeSet<String>>,
}

impl SubscriptionRegistry {
    /// Build from the startup handler list: each handler subscribes its
    /// consumer group to its event type.
    pub fn from_handlers(handlers: &[Arc<dyn EventHandler>]) -> Self {
        let mut by_type: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for handler in handlers {
            by_type
                .entry(handler.event_type().to_string())
                .or_default()
                .insert(handler.consumer_group().to_string());
        }
        Self { by_type }
    }

    /// Build from a static `(event_type, consumer_group)` list.
    ///
    /// The daemon uses this with each handler type's associated constants,
    /// so the registry can exist before the handler instances (which need
    /// the outbox the registry feeds) are constructed.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut by_type: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (event_type, group) in pairs {
            by_type
                .entry(event_type.to_string())
                .or_default()
                .insert(group.to_string());
        }
        Self { by_type }
    }

    /// Consumer groups subscribed to an event type. Empty when nobody
    /// subscribes; `append` then writes the event row but no deliveries.
    pub fn subscribers(&self, event_type: &str) -> Vec<&str> {
        self.by_type
            .get(event_type)
            .map(|groups| groups.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All `(event_type, consumer_group)` pairs, one worker each.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.by_type
            .iter()
            .flat_map(|(t, groups)| groups.iter().map(move |g| (t.as_str(), g.as_str())))
            .collect()
    }
}
