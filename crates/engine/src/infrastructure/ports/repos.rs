//! Repository port traits for session storage.

use async_trait::async_trait;

use tavern_domain::{
    Campaign, CampaignId, JoinCode, PlayerId, SessionState, SessionStatePatch, StatsDelta,
};
use tavern_shared::PlayerRecord;

use super::error::RepoError;

// =============================================================================
// Session State
// =============================================================================

/// Durable board state keyed by join code.
///
/// Writes are merge-patches; there is no version field and the last write
/// wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStateRepo: Send + Sync {
    async fn load(&self, join_code: &JoinCode) -> Result<Option<SessionState>, RepoError>;

    /// Insert a new record. Fails with a conflict when the join
    /// code is already in use.
    async fn create(&self, state: &SessionState) -> Result<(), RepoError>;

    /// Merge `patch` into the record and return the result.
    ///
    /// A missing record is created empty before the patch is applied, so a
    /// failed earlier write heals on the next one. Archived records reject
    /// the write with a conflict.
    async fn save(
        &self,
        join_code: &JoinCode,
        patch: &SessionStatePatch,
    ) -> Result<SessionState, RepoError>;

    /// Mark the session ended. Archiving an archived session is a no-op.
    async fn archive(&self, join_code: &JoinCode) -> Result<SessionState, RepoError>;
}

// =============================================================================
// Players (character-stat collaborator)
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerRepo: Send + Sync {
    async fn list_for_session(&self, join_code: &JoinCode)
        -> Result<Vec<PlayerRecord>, RepoError>;

    async fn get(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
    ) -> Result<Option<PlayerRecord>, RepoError>;

    async fn upsert(&self, join_code: &JoinCode, record: &PlayerRecord) -> Result<(), RepoError>;

    /// Apply a vitals delta to the stored sheet. Returns whether the sheet
    /// changed; a player without a sheet is left untouched.
    async fn apply_stats_delta(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
        delta: &StatsDelta,
    ) -> Result<bool, RepoError>;
}

// =============================================================================
// Campaign reference data (read-only)
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepo: Send + Sync {
    async fn get(&self, id: &CampaignId) -> Result<Option<Campaign>, RepoError>;
    async fn list(&self) -> Result<Vec<Campaign>, RepoError>;
}
