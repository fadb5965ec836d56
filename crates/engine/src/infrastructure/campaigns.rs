//! Campaign catalog loaded from a JSON file.
//!
//! Campaign authoring lives outside the relay; the engine only needs the
//! read-only scene, NPC and pre-gen tables. The file holds either a bare
//! array of campaigns or `{"campaigns": [...]}`.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use tavern_domain::{Campaign, CampaignId};

use crate::infrastructure::ports::{CampaignRepo, RepoError};

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { campaigns: Vec<Campaign> },
    Bare(Vec<Campaign>),
}

/// In-memory, read-only campaign lookup.
#[derive(Debug, Default)]
pub struct JsonCampaignCatalog {
    campaigns: Vec<Campaign>,
}

impl JsonCampaignCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_campaigns(campaigns: Vec<Campaign>) -> Self {
        Self { campaigns }
    }

    pub fn from_json(json: &str) -> Result<Self, RepoError> {
        let file: CatalogFile = serde_json::from_str(json).map_err(RepoError::serialization)?;
        let campaigns = match file {
            CatalogFile::Wrapped { campaigns } | CatalogFile::Bare(campaigns) => campaigns,
        };
        Ok(Self { campaigns })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RepoError::database("load_campaigns", e))?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            campaigns = catalog.campaigns.len(),
            "Loaded campaign catalog"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}

#[async_trait]
impl CampaignRepo for JsonCampaignCatalog {
    async fn get(&self, id: &CampaignId) -> Result<Option<Campaign>, RepoError> {
        Ok(self.campaigns.iter().find(|c| &c.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Campaign>, RepoError> {
        Ok(self.campaigns.clone())
    }
}
