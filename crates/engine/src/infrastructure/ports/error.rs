//! Storage errors shared by every repository port.

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store refused the write: a join code already in use, or a save
    /// against an archived session.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// A stored row or catalog entry could not be decoded.
    #[error("Could not decode stored data: {0}")]
    Serialization(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl ToString) -> Self {
        Self::Conflict(message.to_string())
    }

    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// A persisted row that no longer satisfies a domain invariant.
impl From<tavern_domain::DomainError> for RepoError {
    fn from(e: tavern_domain::DomainError) -> Self {
        Self::Serialization(e.to_string())
    }
}
