//! # Finalizer
//!
//! Deletion-guard marker handling. Both operations are idempotent and
//! return whether a write was made.

use crate::constants::ATTESTER_FINALIZER;
use crate::crd::Attester;
use crate::store::{AttesterStore, StoreError};
use tracing::info;

/// Register the finalizer on a live resource
pub async fn ensure_present(
    store: &dyn AttesterStore,
    attester: &mut Attester,
) -> Result<bool, StoreError> {
    if attester.is_deleting() || attester.has_finalizer() {
        return Ok(false);
    }
    info!("Registering finalizer");
    attester
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(ATTESTER_FINALIZER.to_string());
    *attester = store.update(attester).await?;
    Ok(true)
}

/// Strip the finalizer, leaving any others in place
pub async fn remove(store: &dyn AttesterStore, attester: &mut Attester) -> Result<bool, StoreError> {
    if !attester.has_finalizer() {
        return Ok(false);
    }
    info!("Removing finalizer");
    if let Some(finalizers) = attester.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != ATTESTER_FINALIZER);
    }
    *attester = store.update(attester).await?;
    Ok(true)
}
