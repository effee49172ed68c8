//! # Kubernetes Stores
//!
//! `AttesterStore` and `SecretStore` backed by the Kubernetes API.

use crate::attester::KeyMaterial;
use crate::constants::{CONTROLLER_NAME, MANAGED_BY_LABEL, SECRET_KEYS_FIELD};
use crate::crd::{Attester, ResourceKey};
use crate::store::{key_of, AttesterStore, SecretRecord, SecretStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

fn classify(key: &ResourceKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(key.clone()),
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            key: key.clone(),
            message: api_err.message,
        },
        e => StoreError::Backend {
            key: key.clone(),
            message: e.to_string(),
        },
    }
}

#[derive(Clone)]
pub struct KubeAttesterStore {
    client: Client,
}

impl std::fmt::Debug for KubeAttesterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAttesterStore").finish_non_exhaustive()
    }
}

impl KubeAttesterStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Attester> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl AttesterStore for KubeAttesterStore {
    async fn get(&self, key: &ResourceKey) -> Result<Attester, StoreError> {
        self.api(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| classify(key, e))
    }

    async fn update(&self, attester: &Attester) -> Result<Attester, StoreError> {
        let key = key_of(attester)?;
        // Replace carries resourceVersion, so a stale copy fails with 409
        self.api(&key.namespace)
            .replace(&key.name, &PostParams::default(), attester)
            .await
            .map_err(|e| classify(&key, e))
    }

    async fn update_status(&self, attester: &Attester) -> Result<Attester, StoreError> {
        let key = key_of(attester)?;
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": attester.metadata.resource_version },
            "status": attester.status,
        });
        self.api(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| classify(&key, e))
    }
}

#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, key: &ResourceKey) -> Result<SecretRecord, StoreError> {
        let secret = self
            .api(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| classify(key, e))?;
        let data = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(field, bytes)| (field, bytes.0))
            .collect();
        Ok(SecretRecord { data })
    }

    async fn create(&self, key: &ResourceKey, material: &KeyMaterial) -> Result<(), StoreError> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(key.name.clone()),
                namespace: Some(key.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    CONTROLLER_NAME.to_string(),
                )])),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                SECRET_KEYS_FIELD.to_string(),
                ByteString(material.as_bytes().to_vec()),
            )])),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };
        self.api(&key.namespace)
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|e| classify(key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        match self
            .api(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(secret = %key, "Secret already absent");
                Ok(())
            }
            Err(e) => Err(classify(key, e)),
        }
    }
}
