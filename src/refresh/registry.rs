//! Subscriber registry - Ordered callbacks per refresh key
//!
//! The registry is owned by the coordinator. Subscribers only ever see the
//! opaque [`SubscriptionId`] wrapped in their handle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::base::{RefreshKey, KEY_COUNT};

/// Callback invoked whenever its key refreshes
pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// Identity of a single registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw id value
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Callbacks registered against every key, in subscription order
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: u64,
    slots: [Vec<(SubscriptionId, RefreshCallback)>; KEY_COUNT],
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback to the key's list
    pub fn insert(&mut self, key: RefreshKey, callback: RefreshCallback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.slots[key.index()].push((id, callback));
        id
    }

    /// Removes one registration; returns false if it was already gone
    pub fn remove(&mut self, key: RefreshKey, id: SubscriptionId) -> bool {
        let slot = &mut self.slots[key.index()];
        match slot.iter().position(|(existing, _)| *existing == id) {
            Some(pos) => {
                slot.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Clones the key's current callbacks so they can run without the lock
    pub fn snapshot(&self, key: RefreshKey) -> Vec<(SubscriptionId, RefreshCallback)> {
        self.slots[key.index()].clone()
    }

    pub fn count(&self, key: RefreshKey) -> usize {
        self.slots[key.index()].len()
    }
}

/// Runs each callback in order, isolating panics so later subscribers still run.
///
/// Returns the number of callbacks that panicked.
pub(crate) fn invoke_all(key: RefreshKey, callbacks: &[(SubscriptionId, RefreshCallback)]) -> usize {
    let mut failures = 0;

    for (id, callback) in callbacks {
        if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            failures += 1;
            tracing::warn!(
                "Subscriber {} for '{}' panicked during refresh",
                id.get(),
                key
            );
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn counter_callback(counter: Arc<AtomicU32>) -> RefreshCallback {
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_insert_assigns_unique_ids() {
        let mut registry = SubscriberRegistry::new();
        let callback: RefreshCallback = Arc::new(|| {});

        let a = registry.insert(RefreshKey::Gallery, callback.clone());
        let b = registry.insert(RefreshKey::Gallery, callback);

        assert_ne!(a, b);
        assert_eq!(registry.count(RefreshKey::Gallery), 2);
        assert_eq!(registry.count(RefreshKey::Reviews), 0);
    }

    #[test]
    fn test_remove_is_by_identity() {
        let mut registry = SubscriberRegistry::new();
        let a = registry.insert(RefreshKey::Contacts, Arc::new(|| {}));
        let b = registry.insert(RefreshKey::Contacts, Arc::new(|| {}));

        assert!(registry.remove(RefreshKey::Contacts, a));
        assert!(!registry.remove(RefreshKey::Contacts, a));

        let remaining = registry.snapshot(RefreshKey::Contacts);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, b);
    }

    #[test]
    fn test_remove_under_wrong_key_is_noop() {
        let mut registry = SubscriberRegistry::new();
        let id = registry.insert(RefreshKey::Logging, Arc::new(|| {}));

        assert!(!registry.remove(RefreshKey::Gallery, id));
        assert_eq!(registry.count(RefreshKey::Logging), 1);
    }

    #[test]
    fn test_invoke_all_preserves_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();

        for n in 0..3 {
            let order = order.clone();
            registry.insert(
                RefreshKey::Reviews,
                Arc::new(move || order.lock().unwrap().push(n)),
            );
        }

        let failures = invoke_all(RefreshKey::Reviews, &registry.snapshot(RefreshKey::Reviews));

        assert_eq!(failures, 0);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_invoke_all_isolates_panics() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut registry = SubscriberRegistry::new();

        registry.insert(RefreshKey::Gallery, Arc::new(|| panic!("fetch blew up")));
        registry.insert(RefreshKey::Gallery, counter_callback(counter.clone()));

        let failures = invoke_all(RefreshKey::Gallery, &registry.snapshot(RefreshKey::Gallery));

        assert_eq!(failures, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
