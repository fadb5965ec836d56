//! Roll requests and roll results carried through the session.
//!
//! The relay does not roll dice itself; these are the payload shapes for the
//! GM's request and the player's reported outcome.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// GM asks for a named check at a difficulty.
///
/// Deserializing runs the same checks as [`RollRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RollRequestFields")]
pub struct RollRequest {
    pub check_type: String,
    pub dc: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollRequestFields {
    check_type: String,
    dc: i32,
}

impl TryFrom<RollRequestFields> for RollRequest {
    type Error = DomainError;

    fn try_from(fields: RollRequestFields) -> Result<Self, Self::Error> {
        Self::new(fields.check_type, fields.dc)
    }
}

impl RollRequest {
    pub fn new(check_type: impl Into<String>, dc: i32) -> Result<Self, DomainError> {
        let check_type = check_type.into();
        if check_type.trim().is_empty() {
            return Err(DomainError::validation("Check type cannot be empty"));
        }
        Ok(Self { check_type, dc })
    }
}

/// Single d20-style check: roll plus modifier against a difficulty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardRoll {
    pub check_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<i32>,
    pub roll: i32,
    #[serde(rename = "mod", default)]
    pub modifier: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
}

impl StandardRoll {
    /// Reported total, or roll + modifier when the producer omitted it.
    pub fn resolved_total(&self) -> i32 {
        self.total
            .unwrap_or_else(|| self.roll.saturating_add(self.modifier))
    }

    /// Whether the check met its difficulty, if one was set.
    pub fn succeeded(&self) -> Option<bool> {
        self.dc.map(|dc| self.resolved_total() >= dc)
    }
}

/// One die in a pooled-dice row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollStep {
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Role & Roll pooled check: several rows of dice and a total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledRoll {
    pub total: i32,
    #[serde(default)]
    pub details: Vec<Vec<RollStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
}

impl PooledRoll {
    pub fn dice_count(&self) -> usize {
        self.details.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_roll_uses_wire_mod_key() {
        let roll: StandardRoll = serde_json::from_str(
            r#"{"checkType":"STR Check","dc":15,"roll":12,"mod":3,"total":15}"#,
        )
        .unwrap();

        assert_eq!(roll.modifier, 3);
        assert_eq!(roll.resolved_total(), 15);
        assert_eq!(roll.succeeded(), Some(true));
    }

    #[test]
    fn missing_total_is_computed() {
        let roll: StandardRoll =
            serde_json::from_str(r#"{"checkType":"DEX","roll":4,"mod":-1,"dc":10}"#).unwrap();

        assert_eq!(roll.resolved_total(), 3);
        assert_eq!(roll.succeeded(), Some(false));
    }

    #[test]
    fn pooled_roll_counts_dice_across_rows() {
        let roll: PooledRoll = serde_json::from_str(
            r#"{"total":2,"details":[[{"value":6,"success":true},{"value":2}],[{"value":5,"success":true}]]}"#,
        )
        .unwrap();

        assert_eq!(roll.dice_count(), 3);
        assert_eq!(roll.total, 2);
    }

    #[test]
    fn roll_request_requires_check_type() {
        assert!(RollRequest::new("", 10).is_err());
        assert_eq!(RollRequest::new("STR Check", 15).unwrap().dc, 15);
    }

    #[test]
    fn deserialized_roll_request_requires_check_type() {
        let blank = serde_json::from_str::<RollRequest>(r#"{"checkType":"  ","dc":10}"#);
        assert!(blank.is_err());

        let request: RollRequest =
            serde_json::from_str(r#"{"checkType":"WIS Save","dc":12}"#).unwrap();
        assert_eq!(request, RollRequest::new("WIS Save", 12).unwrap());
    }
}
