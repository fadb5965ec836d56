//! Bootstrap Source Port - reads the session snapshot a late joiner starts from

use async_trait::async_trait;

use tavern_domain::JoinCode;
use tavern_shared::BootstrapSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapFetchError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BootstrapSource: Send + Sync {
    /// Snapshot, reference assets and player records for one session.
    async fn fetch(&self, join_code: &JoinCode) -> Result<BootstrapSnapshot, BootstrapFetchError>;
}
