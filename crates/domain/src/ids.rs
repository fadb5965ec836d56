use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifiers in this domain are opaque strings issued by collaborators
/// (auth provider, campaign store, GM item creator), so they wrap `String`
/// rather than `Uuid`.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Participants
define_id!(PlayerId);

// Campaign reference data
define_id!(CampaignId);
define_id!(SceneId);
define_id!(NpcId);

// Inventory
define_id!(ItemId);

// Broadcast events
define_id!(EventId);

/// Maximum accepted join code length.
const MAX_JOIN_CODE_LEN: usize = 16;

/// Public session identifier, shared out-of-band with players.
///
/// Join codes are case-insensitive; they are normalized to upper case so that
/// `abcd` and `ABCD` address the same session and channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    pub fn new(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Join code cannot be empty"));
        }
        if trimmed.len() > MAX_JOIN_CODE_LEN {
            return Err(DomainError::validation(format!(
                "Join code cannot exceed {MAX_JOIN_CODE_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(
                "Join code must contain only letters and digits",
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JoinCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JoinCode> for String {
    fn from(value: JoinCode) -> Self {
        value.0
    }
}

impl std::str::FromStr for JoinCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_code_is_normalized_to_upper_case() {
        let code = JoinCode::new(" abcd ").unwrap();
        assert_eq!(code.as_str(), "ABCD");
    }

    #[test]
    fn join_code_rejects_empty_and_symbols() {
        assert!(JoinCode::new("").is_err());
        assert!(JoinCode::new("   ").is_err());
        assert!(JoinCode::new("AB-CD").is_err());
        assert!(JoinCode::new("A".repeat(17)).is_err());
    }

    #[test]
    fn join_code_deserializes_through_validation() {
        let code: JoinCode = serde_json::from_str("\"wxyz\"").unwrap();
        assert_eq!(code.to_string(), "WXYZ");

        let invalid: Result<JoinCode, _> = serde_json::from_str("\"no spaces\"");
        assert!(invalid.is_err());
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let id = PlayerId::new("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
    }
}
