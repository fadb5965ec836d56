use std::sync::Arc;

use tavern_domain::JoinCode;
use tavern_shared::{BootstrapSnapshot, CampaignAssets};

use crate::infrastructure::ports::{CampaignRepo, PlayerRepo, RepoError, SessionStateRepo};
use crate::stores::RosterStore;

/// Build the snapshot a joining client loads before subscribing.
///
/// The session record is required. Missing reference data degrades to empty
/// collections: a board without scene names is still playable.
pub struct LoadBootstrap {
    sessions: Arc<dyn SessionStateRepo>,
    players: Arc<dyn PlayerRepo>,
    campaigns: Arc<dyn CampaignRepo>,
    roster: Arc<RosterStore>,
}

impl LoadBootstrap {
    pub fn new(
        sessions: Arc<dyn SessionStateRepo>,
        players: Arc<dyn PlayerRepo>,
        campaigns: Arc<dyn CampaignRepo>,
        roster: Arc<RosterStore>,
    ) -> Self {
        Self {
            sessions,
            players,
            campaigns,
            roster,
        }
    }

    pub async fn execute(&self, join_code: &JoinCode) -> Result<BootstrapSnapshot, BootstrapError> {
        let state = self
            .sessions
            .load(join_code)
            .await?
            .ok_or_else(|| BootstrapError::SessionNotFound(join_code.to_string()))?;

        let players = self.players.list_for_session(join_code).await?;

        let campaign = match state.campaign_id() {
            Some(campaign_id) => match self.campaigns.get(campaign_id).await {
                Ok(Some(campaign)) => CampaignAssets::from(&campaign),
                Ok(None) => {
                    tracing::warn!(
                        join_code = %join_code,
                        campaign_id = %campaign_id,
                        "Campaign missing, bootstrapping without reference data"
                    );
                    CampaignAssets::default()
                }
                Err(e) => {
                    tracing::warn!(
                        join_code = %join_code,
                        campaign_id = %campaign_id,
                        error = %e,
                        "Failed to load campaign, bootstrapping without reference data"
                    );
                    CampaignAssets::default()
                }
            },
            None => CampaignAssets::default(),
        };

        Ok(BootstrapSnapshot {
            join_code: join_code.to_string(),
            players,
            roster: self.roster.list(join_code),
            campaign,
            current_scene_id: state.current_scene_id().cloned(),
            scene_image_url: state.scene_image_url().map(str::to_string),
            active_npcs: state.active_npcs().to_vec(),
            status: state.status(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}
