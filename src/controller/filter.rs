//! # Event Filter
//!
//! Drops watch events this controller caused itself, so its own status and
//! finalizer writes do not immediately trigger another pass.
//!
//! Suppressed:
//! - a watched condition moving from anything to `True`
//! - any change to the finalizer list
//! - deletions (the object is gone; the deletion branch already ran while the
//!   finalizer held it)

use crate::crd::{Attester, Condition, ConditionStatus, ConditionType, ResourceKey};
use kube::ResourceExt;
use kube_runtime::watcher;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Resources that expose conditions and finalizers to the filter
pub trait Conditioned {
    fn conditions(&self) -> &[Condition];
    fn finalizers(&self) -> &[String];
}

impl Conditioned for Attester {
    fn conditions(&self) -> &[Condition] {
        Attester::conditions(self)
    }

    fn finalizers(&self) -> &[String] {
        ResourceExt::finalizers(self)
    }
}

fn status_of(conditions: &[Condition], condition_type: ConditionType) -> Option<ConditionStatus> {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .map(|c| c.status)
}

/// Whether moving from `old` to `new` is worth a pass
pub fn should_reconcile<K: Conditioned>(old: Option<&K>, new: &K) -> bool {
    let Some(old) = old else {
        return true;
    };

    let became_true = ConditionType::ALL.iter().any(|t| {
        status_of(new.conditions(), *t) == Some(ConditionStatus::True)
            && status_of(old.conditions(), *t) != Some(ConditionStatus::True)
    });
    if became_true {
        return false;
    }

    old.finalizers() == new.finalizers()
}

/// Stateful filter over a watch stream
///
/// Remembers the last object seen per identity and applies [`should_reconcile`].
/// A re-list (`Init` .. `InitDone`) drops identities that were not listed again.
#[derive(Debug)]
pub struct ChangeFilter<K> {
    last_seen: HashMap<ResourceKey, K>,
    relisted: Option<HashSet<ResourceKey>>,
}

impl<K> Default for ChangeFilter<K> {
    fn default() -> Self {
        Self {
            last_seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K> ChangeFilter<K>
where
    K: Conditioned + ResourceExt + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `obj` and return it if it should be reconciled
    pub fn observe(&mut self, obj: K) -> Option<K> {
        let key = ResourceKey::for_object(&obj)?;
        let pass = should_reconcile(self.last_seen.get(&key), &obj);
        if !pass {
            trace!(attester = %key, "Suppressed self-inflicted change");
        }
        self.last_seen.insert(key, obj.clone());
        pass.then_some(obj)
    }

    /// Forget an identity once it has been deleted
    pub fn forget(&mut self, obj: &K) {
        if let Some(key) = ResourceKey::for_object(obj) {
            self.last_seen.remove(&key);
        }
    }

    /// Apply the filter to one watcher event
    pub fn process(&mut self, event: watcher::Event<K>) -> Option<K> {
        match event {
            watcher::Event::Apply(obj) => self.observe(obj),
            watcher::Event::InitApply(obj) => {
                if let (Some(relisted), Some(key)) =
                    (self.relisted.as_mut(), ResourceKey::for_object(&obj))
                {
                    relisted.insert(key);
                }
                self.observe(obj)
            }
            watcher::Event::Delete(obj) => {
                self.forget(&obj);
                None
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                None
            }
            watcher::Event::InitDone => {
                if let Some(relisted) = self.relisted.take() {
                    let before = self.last_seen.len();
                    self.last_seen.retain(|key, _| relisted.contains(key));
                    debug!(
                        dropped = before - self.last_seen.len(),
                        "Pruned identities missing from re-list"
                    );
                }
                None
            }
        }
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }

    #[must_use]
    pub fn is_tracked(&self, key: &ResourceKey) -> bool {
        self.last_seen.contains_key(key)
    }
}
