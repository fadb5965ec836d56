//! In-memory session storage.
//!
//! Used when no `SESSION_DB` is configured. Contents are lost on restart.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use tavern_domain::{JoinCode, PlayerId, SessionState, SessionStatePatch, StatsDelta};
use tavern_shared::PlayerRecord;

use crate::infrastructure::ports::{ClockPort, PlayerRepo, RepoError, SessionStateRepo};

pub struct InMemorySessionStore {
    sessions: DashMap<JoinCode, SessionState>,
    players: DashMap<JoinCode, Vec<PlayerRecord>>,
    clock: Arc<dyn ClockPort>,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            sessions: DashMap::new(),
            players: DashMap::new(),
            clock,
        }
    }
}

#[async_trait]
impl SessionStateRepo for InMemorySessionStore {
    async fn load(&self, join_code: &JoinCode) -> Result<Option<SessionState>, RepoError> {
        Ok(self.sessions.get(join_code).map(|s| s.clone()))
    }

    async fn create(&self, state: &SessionState) -> Result<(), RepoError> {
        match self.sessions.entry(state.join_code().clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepoError::conflict(format!(
                "join code already in use: {}",
                state.join_code()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(())
            }
        }
    }

    async fn save(
        &self,
        join_code: &JoinCode,
        patch: &SessionStatePatch,
    ) -> Result<SessionState, RepoError> {
        let now = self.clock.now();
        let mut state = self
            .sessions
            .entry(join_code.clone())
            .or_insert_with(|| SessionState::new(join_code.clone(), now));
        if state.is_archived() {
            return Err(RepoError::conflict(format!(
                "session is archived: {join_code}"
            )));
        }
        state.apply(patch, now);
        Ok(state.clone())
    }

    async fn archive(&self, join_code: &JoinCode) -> Result<SessionState, RepoError> {
        let mut state = self
            .sessions
            .get_mut(join_code)
            .ok_or_else(|| RepoError::not_found("Session", join_code))?;
        state.archive(self.clock.now());
        Ok(state.clone())
    }
}

#[async_trait]
impl PlayerRepo for InMemorySessionStore {
    async fn list_for_session(
        &self,
        join_code: &JoinCode,
    ) -> Result<Vec<PlayerRecord>, RepoError> {
        Ok(self
            .players
            .get(join_code)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
    ) -> Result<Option<PlayerRecord>, RepoError> {
        Ok(self.players.get(join_code).and_then(|players| {
            players
                .iter()
                .find(|p| &p.player_id == player_id)
                .cloned()
        }))
    }

    async fn upsert(&self, join_code: &JoinCode, record: &PlayerRecord) -> Result<(), RepoError> {
        let mut players = self.players.entry(join_code.clone()).or_default();
        match players.iter_mut().find(|p| p.player_id == record.player_id) {
            Some(existing) => *existing = record.clone(),
            None => players.push(record.clone()),
        }
        Ok(())
    }

    async fn apply_stats_delta(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
        delta: &StatsDelta,
    ) -> Result<bool, RepoError> {
        let mut players = self
            .players
            .get_mut(join_code)
            .ok_or_else(|| RepoError::not_found("Player", player_id))?;
        let player = players
            .iter_mut()
            .find(|p| &p.player_id == player_id)
            .ok_or_else(|| RepoError::not_found("Player", player_id))?;
        Ok(player
            .sheet
            .as_mut()
            .is_some_and(|sheet| sheet.apply_delta(delta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use chrono::Utc;
    use tavern_domain::{CharacterSheet, Inventory, NpcId, SceneId, StandardSheet};

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new(Arc::new(FixedClock(Utc::now())))
    }

    fn code() -> JoinCode {
        JoinCode::new("ABCD").unwrap()
    }

    #[tokio::test]
    async fn save_merges_instead_of_replacing() {
        let store = store();
        let npcs = SessionStatePatch::new().with_active_npcs(vec![NpcId::new("n1")]);
        store.save(&code(), &npcs).await.unwrap();

        let scene = SessionStatePatch::new().with_scene(Some(SceneId::new("scene-b")));
        let state = store.save(&code(), &scene).await.unwrap();

        assert_eq!(state.current_scene_id(), Some(&SceneId::new("scene-b")));
        assert_eq!(state.active_npcs(), &[NpcId::new("n1")]);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_join_code() {
        let store = store();
        let state = SessionState::new(code(), Utc::now());
        store.create(&state).await.unwrap();

        let err = store.create(&state).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn archived_session_rejects_writes() {
        let store = store();
        store.create(&SessionState::new(code(), Utc::now())).await.unwrap();
        store.archive(&code()).await.unwrap();

        let patch = SessionStatePatch::new().with_scene(Some(SceneId::new("scene-b")));
        assert!(store.save(&code(), &patch).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn archive_of_unknown_session_is_not_found() {
        assert!(store().archive(&code()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stats_delta_clamps_stored_sheet() {
        let store = store();
        let record = PlayerRecord {
            player_id: PlayerId::new("p1"),
            name: "Ana".to_string(),
            sheet: Some(CharacterSheet::Standard(StandardSheet {
                hp: 5,
                max_hp: 10,
                mp: 0,
                max_mp: 0,
                will_power: 0,
                attributes: Default::default(),
            })),
            inventory: Inventory::new(),
        };
        store.upsert(&code(), &record).await.unwrap();

        let delta = StatsDelta {
            hp: Some(-9999),
            ..Default::default()
        };
        assert!(store
            .apply_stats_delta(&code(), &PlayerId::new("p1"), &delta)
            .await
            .unwrap());

        let stored = store
            .get(&code(), &PlayerId::new("p1"))
            .await
            .unwrap()
            .unwrap();
        let Some(CharacterSheet::Standard(sheet)) = stored.sheet else {
            panic!("expected standard sheet");
        };
        assert_eq!(sheet.hp, 0);
    }
}
