//! Snapshot cache.
//!
//! # Data Flow
//! ```text
//! Watcher (single writer)
//!     → publish(snapshot)    swap the Arc, bump the notifier
//! Readers (any task)
//!     → read()               lock-free Arc clone
//!     → subscribe()          wake on every new revision
//! ```
//!
//! # Design Decisions
//! - ArcSwap for wait-free reads; readers never see a partial update
//! - Revisions only move forward; a stale publish is dropped

pub mod snapshot;

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub use snapshot::{ConfigSnapshot, FieldEntry};

pub struct SnapshotCache {
    current: ArcSwap<ConfigSnapshot>,
    notify: watch::Sender<u64>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(ConfigSnapshot::placeholder()),
            notify,
        }
    }

    /// Replace the current snapshot. Returns `false` if `snapshot` is not
    /// newer than what is already published.
    pub fn publish(&self, snapshot: ConfigSnapshot) -> bool {
        let revision = snapshot.revision();
        let current = self.current.load();
        if revision <= current.revision() && !(revision == 0 && current.is_placeholder()) {
            debug!(
                revision,
                current = current.revision(),
                "Dropping stale snapshot"
            );
            return false;
        }
        self.current.store(Arc::new(snapshot));
        self.notify.send_replace(revision);
        true
    }

    pub fn read(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Revision the next publish should carry.
    pub fn next_revision(&self) -> u64 {
        self.current.load().revision() + 1
    }

    /// Receiver that observes the revision of every publish.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_starts_with_placeholder() {
        let cache = SnapshotCache::new();
        assert_eq!(cache.read().revision(), 0);
        assert_eq!(cache.next_revision(), 1);
    }

    #[test]
    fn test_rejects_stale_publish() {
        let cache = SnapshotCache::new();
        assert!(cache.publish(ConfigSnapshot::new(2, 5, BTreeMap::new())));
        assert!(!cache.publish(ConfigSnapshot::new(1, 9, BTreeMap::new())));
        assert!(!cache.publish(ConfigSnapshot::new(2, 9, BTreeMap::new())));
        assert_eq!(cache.read().store_revision(), 5);
    }

    #[tokio::test]
    async fn test_subscribers_see_new_revisions() {
        let cache = SnapshotCache::new();
        let mut rx = cache.subscribe();
        let held = cache.read();

        cache.publish(ConfigSnapshot::new(1, 1, BTreeMap::new()));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        // earlier readers keep their snapshot
        assert_eq!(held.revision(), 0);
    }
}
