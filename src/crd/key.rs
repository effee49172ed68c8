//! # Resource Key
//!
//! Namespace-qualified identity used for registry keys, secret lookup and logging.

use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `namespace/name` identity of a namespaced object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object, `None` for cluster-scoped objects
    pub fn for_object<K: ResourceExt>(obj: &K) -> Option<Self> {
        Some(Self::new(obj.namespace()?, obj.name_any()))
    }

    /// Another object with the given name in the same namespace
    #[must_use]
    pub fn sibling(&self, name: &str) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
