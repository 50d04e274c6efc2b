use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use datasync_types::now_millis;

/// What kind of change a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Write,
    Import,
    Delete,
}

/// Notification that a database's persisted or cached state changed.
///
/// Sibling contexts use these to invalidate caches and refresh views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChange {
    pub db_name: String,
    pub kind: ChangeKind,
    /// Context that performed the change.
    pub origin_context: String,
    pub timestamp: u64,
}

impl DataChange {
    pub fn new(db_name: impl Into<String>, kind: ChangeKind, origin_context: &str) -> Self {
        Self {
            db_name: db_name.into(),
            kind,
            origin_context: origin_context.to_string(),
            timestamp: now_millis(),
        }
    }
}

/// Per-database change notification fan-out.
///
/// Subscribers that have gone away are dropped on the next publish.
#[derive(Default)]
pub struct ChangeBus {
    subscribers: Mutex<HashMap<String, Vec<Sender<DataChange>>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes for one database.
    pub fn subscribe(&self, db_name: &str) -> Receiver<DataChange> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .entry(db_name.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver `change` to every live subscriber of its database.
    pub fn publish(&self, change: DataChange) {
        let mut subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(&change.db_name) {
            senders.retain(|s| s.send(change.clone()).is_ok());
            debug!(
                "published {:?} for '{}' to {} subscribers",
                change.kind,
                change.db_name,
                senders.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_same_database_subscribers_only() {
        let bus = ChangeBus::new();
        let a = bus.subscribe("a.db");
        let b = bus.subscribe("b.db");

        bus.publish(DataChange::new("a.db", ChangeKind::Write, "ctx-1"));

        let got = a.try_recv().expect("a.db subscriber receives");
        assert_eq!(got.db_name, "a.db");
        assert_eq!(got.kind, ChangeKind::Write);
        assert!(b.try_recv().is_err(), "b.db subscriber must see nothing");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = ChangeBus::new();
        let rx = bus.subscribe("a.db");
        drop(rx);
        // Publishing to a dead subscriber must not error and must prune it.
        bus.publish(DataChange::new("a.db", ChangeKind::Delete, "ctx-1"));
        bus.publish(DataChange::new("a.db", ChangeKind::Delete, "ctx-1"));
    }

    #[test]
    fn change_serde_roundtrip() {
        let change = DataChange::new("a.db", ChangeKind::Import, "ctx-9");
        let json = serde_json::to_string(&change).expect("serialize");
        let back: DataChange = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(change, back);
    }
}
