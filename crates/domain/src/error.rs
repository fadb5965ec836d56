//! Domain error type.
//!
//! The domain only rejects input: ids, codes, check names and role strings
//! that do not satisfy their invariants. Storage and transport failures are
//! owned by the layers that perform the I/O.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value breaks one of its invariants (empty join code, blank item name)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Text could not be read as the requested type
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JoinCode, SessionRole};

    #[test]
    fn bad_join_code_is_a_validation_error() {
        let err = JoinCode::new("  ").unwrap_err();
        assert_eq!(err, DomainError::validation("Join code cannot be empty"));
        assert_eq!(err.to_string(), "Validation failed: Join code cannot be empty");
    }

    #[test]
    fn unknown_role_is_a_parse_error() {
        let err = "wizard".parse::<SessionRole>().unwrap_err();
        assert!(matches!(err, DomainError::Parse(_)));
        assert!(err.to_string().contains("wizard"));
    }
}
