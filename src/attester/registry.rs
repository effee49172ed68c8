//! # Attester Registry
//!
//! In-memory index of ready attesters keyed by resource identity.
//!
//! Entries are immutable `Arc`s replaced wholesale, so a reader holding a
//! snapshot sees either the previous or the next full entry, never a mix.

use crate::attester::ActiveAttester;
use crate::crd::ResourceKey;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default, Clone)]
pub struct AttesterRegistry {
    entries: Arc<RwLock<HashMap<ResourceKey, Arc<ActiveAttester>>>>,
}

impl AttesterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `key`, returning the previous one
    pub fn publish(&self, key: ResourceKey, attester: ActiveAttester) -> Option<Arc<ActiveAttester>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(attester))
    }

    /// Drop the entry for `key`; returns whether one existed
    pub fn remove(&self, key: &ResourceKey) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<ActiveAttester>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Point-in-time copy of every entry
    #[must_use]
    pub fn snapshot(&self) -> HashMap<ResourceKey, Arc<ActiveAttester>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attester::policy::{PolicyCompiler, RegoSourceCompiler};
    use crate::attester::signer::{Ed25519SignerBackend, SignerBackend};

    fn attester(key: &ResourceKey) -> ActiveAttester {
        let policy = RegoSourceCompiler
            .compile(&key.name, "package p\nallow { true }\n", false)
            .unwrap();
        let (signer, _) = Ed25519SignerBackend.new_signer(key).unwrap();
        ActiveAttester::new(key.to_string(), policy, signer)
    }

    #[test]
    fn test_publish_replaces_whole_entry() {
        let registry = AttesterRegistry::new();
        let key = ResourceKey::new("default", "scan");

        assert!(registry.publish(key.clone(), attester(&key)).is_none());
        let first = registry.get(&key).unwrap();
        let previous = registry.publish(key.clone(), attester(&key)).unwrap();

        assert!(Arc::ptr_eq(&first, &previous));
        let current = registry.get(&key).unwrap();
        assert_ne!(current.key_id(), first.key_id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = AttesterRegistry::new();
        let key = ResourceKey::new("default", "scan");
        registry.publish(key.clone(), attester(&key));

        assert!(registry.remove(&key));
        assert!(!registry.remove(&key));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_later_writes() {
        let registry = AttesterRegistry::new();
        let a = ResourceKey::new("default", "a");
        let b = ResourceKey::new("default", "b");
        registry.publish(a.clone(), attester(&a));

        let snapshot = registry.snapshot();
        registry.publish(b.clone(), attester(&b));
        registry.remove(&a);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&a));
        assert_eq!(registry.snapshot().keys().collect::<Vec<_>>(), vec![&b]);
    }

    #[test]
    fn test_concurrent_publishers_and_readers() {
        let registry = AttesterRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let key = ResourceKey::new("default", format!("att-{i}"));
                    for _ in 0..10 {
                        registry.publish(key.clone(), attester(&key));
                        for entry in registry.snapshot().values() {
                            assert_eq!(entry.policy().package(), "p");
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
