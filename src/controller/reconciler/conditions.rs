//! # Conditions
//!
//! Condition bookkeeping for the Attester status block.
//!
//! Conditions are handled as a map from type to condition and only turned
//! back into the persisted two-slot list (`Compiled`, `SecretReady`) on write.
//! A status whose list is not exactly that shape is treated as uninitialized.

use crate::crd::{Attester, Condition, ConditionStatus, ConditionType, ResourceKey};
use crate::store::{AttesterStore, StoreError};
use kube::ResourceExt;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("conditions of {0} are not initialized")]
    Uninitialized(ResourceKey),
    #[error("failed to persist conditions: {0}")]
    Store(#[from] StoreError),
}

/// Keyed view of an Attester's conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSet {
    conditions: BTreeMap<ConditionType, Condition>,
}

impl ConditionSet {
    /// Both conditions False
    #[must_use]
    pub fn initial() -> Self {
        let conditions = ConditionType::ALL
            .iter()
            .map(|t| (*t, Condition::new(*t, ConditionStatus::False)))
            .collect();
        Self { conditions }
    }

    /// Read the persisted slots, `None` unless they hold exactly one condition
    /// per type in slot order
    #[must_use]
    pub fn from_slots(slots: &[Condition]) -> Option<Self> {
        if slots.len() != ConditionType::ALL.len() {
            return None;
        }
        let in_order = slots
            .iter()
            .zip(ConditionType::ALL)
            .all(|(condition, expected)| condition.r#type == expected);
        if !in_order {
            return None;
        }
        let conditions = slots.iter().map(|c| (c.r#type, c.clone())).collect();
        Some(Self { conditions })
    }

    /// Rebuild a valid set from whatever an existing status holds, keeping
    /// the first status seen for each known type
    #[must_use]
    pub fn repaired(slots: &[Condition]) -> Self {
        let mut set = Self::initial();
        for condition in slots.iter().rev() {
            set.conditions.insert(condition.r#type, condition.clone());
        }
        set
    }

    #[must_use]
    pub fn status(&self, condition_type: ConditionType) -> ConditionStatus {
        self.conditions
            .get(&condition_type)
            .map_or(ConditionStatus::Unknown, |c| c.status)
    }

    /// Set a status; returns whether anything changed
    pub fn set(&mut self, condition_type: ConditionType, status: ConditionStatus) -> bool {
        if self.status(condition_type) == status {
            return false;
        }
        self.conditions
            .insert(condition_type, Condition::new(condition_type, status));
        true
    }

    /// Persisted form, in slot order
    #[must_use]
    pub fn into_slots(self) -> Vec<Condition> {
        self.conditions.into_values().collect()
    }
}

async fn persist(
    store: &dyn AttesterStore,
    attester: &mut Attester,
    set: ConditionSet,
) -> Result<(), StoreError> {
    attester.status_mut().conditions = set.into_slots();
    *attester = store.update_status(attester).await?;
    Ok(())
}

/// Create both conditions as False when the status has none, or repair a
/// status that lost its two-slot shape. Returns whether a write happened.
pub async fn initialize_conditions(
    store: &dyn AttesterStore,
    attester: &mut Attester,
) -> Result<bool, ConditionError> {
    if ConditionSet::from_slots(attester.conditions()).is_some() {
        return Ok(false);
    }
    let set = if attester.conditions().is_empty() {
        info!("Initializing conditions");
        ConditionSet::initial()
    } else {
        info!(found = attester.conditions().len(), "Repairing malformed conditions");
        ConditionSet::repaired(attester.conditions())
    };
    persist(store, attester, set).await?;
    Ok(true)
}

/// Write `status` into the slot for `condition_type`.
///
/// Skips the write when the stored status already matches. Returns whether a
/// write happened.
pub async fn set_condition(
    store: &dyn AttesterStore,
    attester: &mut Attester,
    condition_type: ConditionType,
    status: ConditionStatus,
) -> Result<bool, ConditionError> {
    let mut set = ConditionSet::from_slots(attester.conditions()).ok_or_else(|| {
        ConditionError::Uninitialized(ResourceKey::new(
            attester.namespace().unwrap_or_default(),
            attester.name_any(),
        ))
    })?;
    if !set.set(condition_type, status) {
        debug!(condition = %condition_type, %status, "Condition unchanged");
        return Ok(false);
    }
    persist(store, attester, set).await?;
    info!(condition = %condition_type, %status, "Condition updated");
    Ok(true)
}

/// Current status of one condition, `None` before initialization
#[must_use]
pub fn condition_status(attester: &Attester, condition_type: ConditionType) -> Option<ConditionStatus> {
    ConditionSet::from_slots(attester.conditions()).map(|set| set.status(condition_type))
}
