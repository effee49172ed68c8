//! # Attester Status
//!
//! Status block and condition types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the Attester resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttesterStatus {
    /// Exactly two conditions once initialized: `Compiled` then `SecretReady`
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition types tracked on an Attester
///
/// Declaration order is the persisted slot order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    schemars::JsonSchema,
)]
pub enum ConditionType {
    /// The policy source compiled successfully
    Compiled,
    /// The signing secret exists and holds usable key material
    SecretReady,
}

impl ConditionType {
    /// All condition types in slot order
    pub const ALL: [ConditionType; 2] = [ConditionType::Compiled, ConditionType::SecretReady];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Compiled => "Compiled",
            ConditionType::SecretReady => "SecretReady",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state condition status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a status condition of an Attester
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: ConditionType,
    /// Status of the condition
    pub status: ConditionStatus,
    /// Last time the status value changed (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    #[must_use]
    pub fn new(r#type: ConditionType, status: ConditionStatus) -> Self {
        Self {
            r#type,
            status,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_serializes_with_kubernetes_field_names() {
        let condition = Condition {
            r#type: ConditionType::SecretReady,
            status: ConditionStatus::True,
            last_transition_time: None,
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json, serde_json::json!({"type": "SecretReady", "status": "True"}));
    }

    #[test]
    fn test_condition_ordering_matches_slot_order() {
        let mut sorted = ConditionType::ALL;
        sorted.sort();
        assert_eq!(sorted, ConditionType::ALL);
    }

    #[test]
    fn test_status_deserializes_without_conditions() {
        let status: AttesterStatus = serde_json::from_str("{}").unwrap();
        assert!(status.conditions.is_empty());
    }
}
