use std::sync::Arc;

use tavern_domain::{CampaignId, JoinCode, PlayerId, SessionState};
use tavern_shared::{PlayerRecord, UpsertPlayerRequest};

use crate::infrastructure::ports::{
    CampaignRepo, ClockPort, PlayerRepo, RandomPort, RepoError, SessionStateRepo,
};
use crate::stores::RosterStore;

/// Characters used for generated join codes. No 0/O or 1/I.
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const JOIN_CODE_LEN: usize = 4;
const MAX_CODE_ATTEMPTS: usize = 8;

/// Start a session from a campaign.
pub struct StartSession {
    campaigns: Arc<dyn CampaignRepo>,
    sessions: Arc<dyn SessionStateRepo>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl StartSession {
    pub fn new(
        campaigns: Arc<dyn CampaignRepo>,
        sessions: Arc<dyn SessionStateRepo>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            campaigns,
            sessions,
            clock,
            random,
        }
    }

    /// Create the session record. Without a requested code a random one is
    /// drawn, retrying on collisions.
    pub async fn execute(
        &self,
        campaign_id: &CampaignId,
        requested_code: Option<&str>,
    ) -> Result<SessionState, SessionLifecycleError> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| SessionLifecycleError::CampaignNotFound(campaign_id.to_string()))?;

        if let Some(code) = requested_code {
            let join_code = JoinCode::new(code)
                .map_err(|e| SessionLifecycleError::InvalidJoinCode(e.to_string()))?;
            let state = SessionState::start(join_code, &campaign, self.clock.now());
            return self.create(state).await;
        }

        let mut last_code = String::new();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let join_code = self.generate_code()?;
            last_code = join_code.to_string();
            let state = SessionState::start(join_code, &campaign, self.clock.now());
            match self.create(state).await {
                Err(SessionLifecycleError::JoinCodeTaken(code)) => {
                    tracing::debug!(join_code = %code, "Generated join code collided, retrying");
                }
                other => return other,
            }
        }
        Err(SessionLifecycleError::JoinCodeTaken(last_code))
    }

    async fn create(&self, state: SessionState) -> Result<SessionState, SessionLifecycleError> {
        match self.sessions.create(&state).await {
            Ok(()) => {
                tracing::info!(
                    join_code = %state.join_code(),
                    campaign_id = ?state.campaign_id(),
                    "Session started"
                );
                Ok(state)
            }
            Err(e) if e.is_conflict() => Err(SessionLifecycleError::JoinCodeTaken(
                state.join_code().to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn generate_code(&self) -> Result<JoinCode, SessionLifecycleError> {
        let max = JOIN_CODE_ALPHABET.len() as i32 - 1;
        let code: String = (0..JOIN_CODE_LEN)
            .map(|_| {
                let index = self.random.gen_range(0, max).clamp(0, max) as usize;
                char::from(JOIN_CODE_ALPHABET[index])
            })
            .collect();
        JoinCode::new(&code).map_err(|e| SessionLifecycleError::InvalidJoinCode(e.to_string()))
    }
}

/// Archive a session and drop its runtime roster.
pub struct EndSession {
    sessions: Arc<dyn SessionStateRepo>,
    roster: Arc<RosterStore>,
}

impl EndSession {
    pub fn new(sessions: Arc<dyn SessionStateRepo>, roster: Arc<RosterStore>) -> Self {
        Self { sessions, roster }
    }

    pub async fn execute(&self, join_code: &JoinCode) -> Result<SessionState, SessionLifecycleError> {
        let state = self.sessions.archive(join_code).await.map_err(|e| {
            if e.is_not_found() {
                SessionLifecycleError::SessionNotFound(join_code.to_string())
            } else {
                e.into()
            }
        })?;
        self.roster.clear(join_code);
        tracing::info!(join_code = %join_code, "Session ended");
        Ok(state)
    }
}

pub struct GetSession {
    sessions: Arc<dyn SessionStateRepo>,
}

impl GetSession {
    pub fn new(sessions: Arc<dyn SessionStateRepo>) -> Self {
        Self { sessions }
    }

    pub async fn execute(&self, join_code: &JoinCode) -> Result<SessionState, SessionLifecycleError> {
        self.sessions
            .load(join_code)
            .await?
            .ok_or_else(|| SessionLifecycleError::SessionNotFound(join_code.to_string()))
    }
}

/// Register or update a player's persisted character for a session.
pub struct RegisterPlayer {
    sessions: Arc<dyn SessionStateRepo>,
    players: Arc<dyn PlayerRepo>,
}

impl RegisterPlayer {
    pub fn new(sessions: Arc<dyn SessionStateRepo>, players: Arc<dyn PlayerRepo>) -> Self {
        Self { sessions, players }
    }

    pub async fn execute(
        &self,
        join_code: &JoinCode,
        player_id: PlayerId,
        request: UpsertPlayerRequest,
    ) -> Result<PlayerRecord, SessionLifecycleError> {
        let state = self
            .sessions
            .load(join_code)
            .await?
            .ok_or_else(|| SessionLifecycleError::SessionNotFound(join_code.to_string()))?;
        if state.is_archived() {
            return Err(SessionLifecycleError::SessionEnded(join_code.to_string()));
        }

        let record = PlayerRecord {
            player_id,
            name: request.name,
            sheet: request.sheet,
            inventory: request.inventory,
        };
        self.players.upsert(join_code, &record).await?;
        tracing::info!(
            join_code = %join_code,
            player_id = %record.player_id,
            "Player registered"
        );
        Ok(record)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionLifecycleError {
    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),
    #[error("Invalid join code: {0}")]
    InvalidJoinCode(String),
    #[error("Join code already in use: {0}")]
    JoinCodeTaken(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session has ended: {0}")]
    SessionEnded(String),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;

    use tavern_domain::{Campaign, GameSystem, RosterEntry, SceneId, SceneRef};

    use crate::infrastructure::ports::{
        MockCampaignRepo, MockClockPort, MockPlayerRepo, MockRandomPort, MockSessionStateRepo,
    };

    fn campaign() -> Campaign {
        Campaign {
            id: CampaignId::new("camp-1"),
            name: "The Sunken Keep".to_string(),
            system: GameSystem::Standard,
            scenes: vec![SceneRef {
                id: SceneId::new("gate"),
                name: "Gate".to_string(),
                image_url: Some("gate.jpg".to_string()),
            }],
            npcs: Vec::new(),
            pre_gens: Vec::new(),
        }
    }

    fn clock() -> Arc<MockClockPort> {
        let mut clock = MockClockPort::new();
        clock
            .expect_now()
            .returning(|| Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        Arc::new(clock)
    }

    fn campaigns() -> Arc<MockCampaignRepo> {
        let mut campaigns = MockCampaignRepo::new();
        campaigns
            .expect_get()
            .returning(|id| Ok((id.as_str() == "camp-1").then(campaign)));
        Arc::new(campaigns)
    }

    #[tokio::test]
    async fn start_uses_campaign_first_scene() {
        let mut sessions = MockSessionStateRepo::new();
        sessions.expect_create().times(1).returning(|_| Ok(()));
        let use_case = StartSession::new(
            campaigns(),
            Arc::new(sessions),
            clock(),
            Arc::new(MockRandomPort::new()),
        );

        let state = use_case
            .execute(&CampaignId::new("camp-1"), Some("keep"))
            .await
            .unwrap();

        assert_eq!(state.join_code().as_str(), "KEEP");
        assert_eq!(state.current_scene_id(), Some(&SceneId::new("gate")));
        assert_eq!(state.scene_image_url(), Some("gate.jpg"));
    }

    #[tokio::test]
    async fn when_campaign_not_found_returns_error() {
        let use_case = StartSession::new(
            campaigns(),
            Arc::new(MockSessionStateRepo::new()),
            clock(),
            Arc::new(MockRandomPort::new()),
        );

        let result = use_case.execute(&CampaignId::new("nope"), None).await;
        assert!(matches!(result, Err(SessionLifecycleError::CampaignNotFound(_))));
    }

    #[tokio::test]
    async fn generated_code_retries_after_collision() {
        let mut sessions = MockSessionStateRepo::new();
        let mut seq = mockall::Sequence::new();
        sessions
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(RepoError::conflict("taken")));
        sessions
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut random = MockRandomPort::new();
        random.expect_gen_range().returning(|min, _| min);

        let use_case = StartSession::new(campaigns(), Arc::new(sessions), clock(), Arc::new(random));
        let state = use_case
            .execute(&CampaignId::new("camp-1"), None)
            .await
            .unwrap();

        assert_eq!(state.join_code().as_str(), "AAAA");
    }

    #[tokio::test]
    async fn requested_code_in_use_is_reported() {
        let mut sessions = MockSessionStateRepo::new();
        sessions
            .expect_create()
            .times(1)
            .returning(|_| Err(RepoError::conflict("taken")));
        let use_case = StartSession::new(
            campaigns(),
            Arc::new(sessions),
            clock(),
            Arc::new(MockRandomPort::new()),
        );

        let result = use_case
            .execute(&CampaignId::new("camp-1"), Some("ABCD"))
            .await;
        assert!(matches!(result, Err(SessionLifecycleError::JoinCodeTaken(code)) if code == "ABCD"));
    }

    #[tokio::test]
    async fn end_session_archives_and_clears_roster() {
        let code = JoinCode::new("ABCD").unwrap();
        let mut sessions = MockSessionStateRepo::new();
        sessions
            .expect_archive()
            .with(eq(code.clone()))
            .returning(|code| {
                let mut state = SessionState::new(code.clone(), Utc::now());
                state.archive(Utc::now());
                Ok(state)
            });
        let roster = Arc::new(RosterStore::new());
        roster.join(
            &code,
            RosterEntry {
                player_id: PlayerId::new("p1"),
                name: "Ana".to_string(),
                character: None,
            },
        );

        let state = EndSession::new(Arc::new(sessions), roster.clone())
            .execute(&code)
            .await
            .unwrap();

        assert!(state.is_archived());
        assert!(roster.list(&code).is_empty());
    }

    #[tokio::test]
    async fn end_unknown_session_returns_not_found() {
        let mut sessions = MockSessionStateRepo::new();
        sessions
            .expect_archive()
            .returning(|code| Err(RepoError::not_found("Session", code)));

        let result = EndSession::new(Arc::new(sessions), Arc::new(RosterStore::new()))
            .execute(&JoinCode::new("ABCD").unwrap())
            .await;
        assert!(matches!(result, Err(SessionLifecycleError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn register_player_requires_session() {
        let mut sessions = MockSessionStateRepo::new();
        sessions.expect_load().returning(|_| Ok(None));

        let result = RegisterPlayer::new(Arc::new(sessions), Arc::new(MockPlayerRepo::new()))
            .execute(
                &JoinCode::new("ABCD").unwrap(),
                PlayerId::new("p1"),
                UpsertPlayerRequest {
                    name: "Ana".to_string(),
                    sheet: None,
                    inventory: Default::default(),
                },
            )
            .await;
        assert!(matches!(result, Err(SessionLifecycleError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn register_player_stores_record() {
        let mut sessions = MockSessionStateRepo::new();
        sessions
            .expect_load()
            .returning(|code| Ok(Some(SessionState::new(code.clone(), Utc::now()))));
        let mut players = MockPlayerRepo::new();
        players
            .expect_upsert()
            .withf(|_, record| record.player_id.as_str() == "p1" && record.name == "Ana")
            .times(1)
            .returning(|_, _| Ok(()));

        let record = RegisterPlayer::new(Arc::new(sessions), Arc::new(players))
            .execute(
                &JoinCode::new("ABCD").unwrap(),
                PlayerId::new("p1"),
                UpsertPlayerRequest {
                    name: "Ana".to_string(),
                    sheet: None,
                    inventory: Default::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.name, "Ana");
    }
}
