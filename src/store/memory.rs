//! # In-Memory Stores
//!
//! `AttesterStore` and `SecretStore` kept in process memory.
//!
//! Writes follow API server rules closely enough for reconciliation tests:
//! every write bumps `resourceVersion`, a stale version is a conflict, spec and
//! status writes touch only their own half of the object, and an object marked
//! for deletion disappears once its last finalizer is removed.

use crate::attester::KeyMaterial;
use crate::constants::SECRET_KEYS_FIELD;
use crate::crd::{Attester, ResourceKey};
use crate::store::{key_of, AttesterStore, SecretRecord, SecretStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct AttesterState {
    objects: HashMap<ResourceKey, Attester>,
    version: u64,
    spec_writes: usize,
    status_writes: usize,
    fail_status_writes: bool,
}

impl AttesterState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn current(&self, key: &ResourceKey, incoming: &Attester) -> Result<&Attester, StoreError> {
        let stored = self
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if incoming.metadata.resource_version != stored.metadata.resource_version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                message: format!(
                    "resourceVersion {:?} is stale, current is {:?}",
                    incoming.metadata.resource_version, stored.metadata.resource_version
                ),
            });
        }
        Ok(stored)
    }
}

/// Attester store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAttesterStore {
    state: Arc<Mutex<AttesterState>>,
}

impl MemoryAttesterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AttesterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or overwrite an object, as a user applying a manifest would
    pub fn insert(&self, mut attester: Attester) -> Result<ResourceKey, StoreError> {
        let key = key_of(&attester)?;
        let mut state = self.lock();
        attester.metadata.resource_version = Some(state.next_version());
        state.objects.insert(key.clone(), attester);
        Ok(key)
    }

    /// Set the deletion timestamp; objects without finalizers go away at once
    pub fn mark_for_deletion(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let now: Time =
            serde_json::from_value(serde_json::json!(chrono::Utc::now().to_rfc3339()))
                .map_err(|e| StoreError::Backend {
                    key: key.clone(),
                    message: e.to_string(),
                })?;
        let mut state = self.lock();
        let version = state.next_version();
        let object = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        object.metadata.deletion_timestamp = Some(now);
        object.metadata.resource_version = Some(version);
        if object.metadata.finalizers.as_ref().is_none_or(Vec::is_empty) {
            state.objects.remove(key);
        }
        Ok(())
    }

    /// Current stored copy, if present
    #[must_use]
    pub fn get_snapshot(&self, key: &ResourceKey) -> Option<Attester> {
        self.lock().objects.get(key).cloned()
    }

    /// Number of metadata/spec writes accepted so far
    #[must_use]
    pub fn spec_writes(&self) -> usize {
        self.lock().spec_writes
    }

    /// Number of status writes accepted so far
    #[must_use]
    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    /// Make every subsequent status write fail with a backend error
    pub fn fail_status_writes(&self, fail: bool) {
        self.lock().fail_status_writes = fail;
    }
}

#[async_trait]
impl AttesterStore for MemoryAttesterStore {
    async fn get(&self, key: &ResourceKey) -> Result<Attester, StoreError> {
        self.lock()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn update(&self, attester: &Attester) -> Result<Attester, StoreError> {
        let key = key_of(attester)?;
        let mut state = self.lock();
        let status = state.current(&key, attester)?.status.clone();

        let mut updated = attester.clone();
        updated.status = status;
        updated.metadata.resource_version = Some(state.next_version());
        state.spec_writes += 1;

        let released = updated.is_deleting()
            && updated.metadata.finalizers.as_ref().is_none_or(Vec::is_empty);
        if released {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, attester: &Attester) -> Result<Attester, StoreError> {
        let key = key_of(attester)?;
        let mut state = self.lock();
        if state.fail_status_writes {
            return Err(StoreError::Backend {
                key,
                message: "status writes disabled".to_string(),
            });
        }
        let mut updated = state.current(&key, attester)?.clone();
        updated.status = attester.status.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.status_writes += 1;
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }
}

#[derive(Debug, Default)]
struct SecretState {
    secrets: HashMap<ResourceKey, SecretRecord>,
    creates: usize,
    deletes: usize,
    fail_create: bool,
    fail_delete: bool,
}

/// Secret store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    state: Arc<Mutex<SecretState>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SecretState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store arbitrary data fields under `key`, bypassing the create path
    pub fn insert_raw(&self, key: ResourceKey, data: BTreeMap<String, Vec<u8>>) {
        self.lock().secrets.insert(key, SecretRecord { data });
    }

    /// The `keys` field of a stored secret
    #[must_use]
    pub fn key_material(&self, key: &ResourceKey) -> Option<Vec<u8>> {
        self.lock()
            .secrets
            .get(key)
            .and_then(|record| record.data.get(SECRET_KEYS_FIELD).cloned())
    }

    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lock().secrets.contains_key(key)
    }

    #[must_use]
    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    #[must_use]
    pub fn deletes(&self) -> usize {
        self.lock().deletes
    }

    pub fn fail_create(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.lock().fail_delete = fail;
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &ResourceKey) -> Result<SecretRecord, StoreError> {
        self.lock()
            .secrets
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn create(&self, key: &ResourceKey, material: &KeyMaterial) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(StoreError::Backend {
                key: key.clone(),
                message: "secret creation disabled".to_string(),
            });
        }
        if state.secrets.contains_key(key) {
            return Err(StoreError::Conflict {
                key: key.clone(),
                message: "secret already exists".to_string(),
            });
        }
        let data = BTreeMap::from([(SECRET_KEYS_FIELD.to_string(), material.as_bytes().to_vec())]);
        state.secrets.insert(key.clone(), SecretRecord { data });
        state.creates += 1;
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_delete {
            return Err(StoreError::Backend {
                key: key.clone(),
                message: "secret deletion disabled".to_string(),
            });
        }
        if state.secrets.remove(key).is_some() {
            state.deletes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AttesterSpec;

    fn attester(name: &str) -> Attester {
        let mut attester = Attester::new(
            name,
            AttesterSpec {
                policy: "package p\nallow { true }\n".to_string(),
                pgp_secret: String::new(),
            },
        );
        attester.metadata.namespace = Some("default".to_string());
        attester
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let store = MemoryAttesterStore::new();
        let key = store.insert(attester("scan")).unwrap();

        let first = store.get(&key).await.unwrap();
        let mut stale = first.clone();
        store.update(&first).await.unwrap();

        stale.spec.pgp_secret = "other".to_string();
        let err = store.update(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_spec_and_status_writes_are_separate() {
        let store = MemoryAttesterStore::new();
        let key = store.insert(attester("scan")).unwrap();

        let mut copy = store.get(&key).await.unwrap();
        copy.spec.pgp_secret = "scan".to_string();
        copy.status_mut();
        let updated = store.update(&copy).await.unwrap();
        assert_eq!(updated.spec.pgp_secret, "scan");
        assert!(updated.status.is_none());

        let mut copy = updated;
        copy.status_mut();
        copy.spec.pgp_secret = "ignored".to_string();
        let updated = store.update_status(&copy).await.unwrap();
        assert_eq!(updated.spec.pgp_secret, "scan");
        assert!(updated.status.is_some());

        assert_eq!(store.spec_writes(), 1);
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_removing_last_finalizer_releases_deleting_object() {
        let store = MemoryAttesterStore::new();
        let mut object = attester("scan");
        object.metadata.finalizers = Some(vec!["example.com/guard".to_string()]);
        let key = store.insert(object).unwrap();

        store.mark_for_deletion(&key).unwrap();
        let mut deleting = store.get(&key).await.unwrap();
        assert!(deleting.is_deleting());

        deleting.metadata.finalizers = Some(Vec::new());
        store.update(&deleting).await.unwrap();
        assert!(store.get(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_secret_create_conflicts_and_delete_is_idempotent() {
        let store = MemorySecretStore::new();
        let key = ResourceKey::new("default", "scan");
        let material = KeyMaterial::from(b"material".to_vec());

        store.create(&key, &material).await.unwrap();
        let err = store.create(&key, &material).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.key_material(&key).unwrap(), b"material");

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert_eq!(store.deletes(), 1);
        assert!(!store.contains(&key));
    }
}
