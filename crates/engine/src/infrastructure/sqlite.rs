//! SQLite-backed session storage.
//!
//! Session rows keep the persisted shape shared with other producers:
//! `active_npcs` is a JSON-encoded array in a TEXT column. Empty or invalid
//! text reads back as no NPCs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tavern_domain::{
    CharacterSheet, Inventory, JoinCode, PlayerId, SessionState, SessionStatePatch, StatsDelta,
};
use tavern_shared::{PlayerRecord, SessionRecord};

use crate::infrastructure::ports::{ClockPort, PlayerRepo, RepoError, SessionStateRepo};

/// SQLite implementation of session state and player storage.
pub struct SqliteSessionStore {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteSessionStore {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("connect", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                join_code TEXT PRIMARY KEY,
                campaign_id TEXT,
                current_scene_id TEXT,
                scene_image_url TEXT,
                active_npcs TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("migrate", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_players (
                join_code TEXT NOT NULL,
                player_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sheet_json TEXT,
                inventory_json TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (join_code, player_id)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("migrate", e))?;

        Ok(Self { pool, clock })
    }

    async fn fetch_session<'e, E>(
        executor: E,
        join_code: &JoinCode,
    ) -> Result<Option<SessionState>, RepoError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT join_code, campaign_id, current_scene_id, scene_image_url,
                   active_npcs, status, updated_at
            FROM sessions WHERE join_code = ?
            "#,
        )
        .bind(join_code.as_str())
        .fetch_optional(executor)
        .await
        .map_err(|e| RepoError::database("load_session", e))?;

        row.map(|row| session_record(&row)?.into_state().map_err(RepoError::from))
            .transpose()
    }

    async fn write_session<'e, E>(executor: E, state: &SessionState) -> Result<(), RepoError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let record = SessionRecord::from(state);
        sqlx::query(
            r#"
            INSERT INTO sessions (join_code, campaign_id, current_scene_id, scene_image_url,
                                  active_npcs, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(join_code) DO UPDATE SET
                campaign_id = excluded.campaign_id,
                current_scene_id = excluded.current_scene_id,
                scene_image_url = excluded.scene_image_url,
                active_npcs = excluded.active_npcs,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.join_code)
        .bind(record.campaign_id)
        .bind(record.current_scene_id)
        .bind(record.scene_image_url)
        .bind(record.active_npcs)
        .bind(record.status)
        .bind(record.updated_at.to_rfc3339())
        .execute(executor)
        .await
        .map_err(|e| RepoError::database("save_session", e))?;
        Ok(())
    }

    async fn write_player(&self, join_code: &JoinCode, record: &PlayerRecord) -> Result<(), RepoError> {
        let sheet_json = record
            .sheet
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(RepoError::serialization)?;
        let inventory_json =
            serde_json::to_string(&record.inventory).map_err(RepoError::serialization)?;

        sqlx::query(
            r#"
            INSERT INTO session_players (join_code, player_id, name, sheet_json, inventory_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(join_code, player_id) DO UPDATE SET
                name = excluded.name,
                sheet_json = excluded.sheet_json,
                inventory_json = excluded.inventory_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(join_code.as_str())
        .bind(record.player_id.as_str())
        .bind(&record.name)
        .bind(sheet_json)
        .bind(inventory_json)
        .bind(self.clock.now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_player", e))?;
        Ok(())
    }
}

fn session_record(row: &SqliteRow) -> Result<SessionRecord, RepoError> {
    let updated_at: String = row.get("updated_at");
    Ok(SessionRecord {
        join_code: row.get("join_code"),
        campaign_id: row.get("campaign_id"),
        current_scene_id: row.get("current_scene_id"),
        active_npcs: row
            .get::<Option<String>, _>("active_npcs")
            .unwrap_or_default(),
        scene_image_url: row.get("scene_image_url"),
        status: row.get("status"),
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn player_record(row: &SqliteRow) -> Result<PlayerRecord, RepoError> {
    let sheet_json: Option<String> = row.get("sheet_json");
    let inventory_json: String = row.get("inventory_json");

    let sheet = sheet_json
        .filter(|s| !s.trim().is_empty())
        .map(|s| serde_json::from_str::<CharacterSheet>(&s))
        .transpose()
        .map_err(RepoError::serialization)?;
    // Inventory is client-held; an unreadable column is an empty list.
    let inventory = serde_json::from_str::<Inventory>(&inventory_json).unwrap_or_default();

    Ok(PlayerRecord {
        player_id: PlayerId::new(row.get::<String, _>("player_id")),
        name: row.get("name"),
        sheet,
        inventory,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(RepoError::serialization)
}

#[async_trait]
impl SessionStateRepo for SqliteSessionStore {
    async fn load(&self, join_code: &JoinCode) -> Result<Option<SessionState>, RepoError> {
        Self::fetch_session(&self.pool, join_code).await
    }

    async fn create(&self, state: &SessionState) -> Result<(), RepoError> {
        let record = SessionRecord::from(state);
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (join_code, campaign_id, current_scene_id, scene_image_url,
                                  active_npcs, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(join_code) DO NOTHING
            "#,
        )
        .bind(record.join_code)
        .bind(record.campaign_id)
        .bind(record.current_scene_id)
        .bind(record.scene_image_url)
        .bind(record.active_npcs)
        .bind(record.status)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("create_session", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::conflict(format!(
                "join code already in use: {}",
                state.join_code()
            )));
        }
        Ok(())
    }

    async fn save(
        &self,
        join_code: &JoinCode,
        patch: &SessionStatePatch,
    ) -> Result<SessionState, RepoError> {
        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("save_session", e))?;

        let mut state = Self::fetch_session(&mut *tx, join_code)
            .await?
            .unwrap_or_else(|| SessionState::new(join_code.clone(), now));
        if state.is_archived() {
            return Err(RepoError::conflict(format!(
                "session is archived: {join_code}"
            )));
        }

        if state.apply(patch, now) {
            Self::write_session(&mut *tx, &state).await?;
        }
        tx.commit()
            .await
            .map_err(|e| RepoError::database("save_session", e))?;

        Ok(state)
    }

    async fn archive(&self, join_code: &JoinCode) -> Result<SessionState, RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("archive_session", e))?;

        let mut state = Self::fetch_session(&mut *tx, join_code)
            .await?
            .ok_or_else(|| RepoError::not_found("Session", join_code))?;
        state.archive(self.clock.now());
        Self::write_session(&mut *tx, &state).await?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("archive_session", e))?;
        Ok(state)
    }
}

#[async_trait]
impl PlayerRepo for SqliteSessionStore {
    async fn list_for_session(
        &self,
        join_code: &JoinCode,
    ) -> Result<Vec<PlayerRecord>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT player_id, name, sheet_json, inventory_json
            FROM session_players WHERE join_code = ?
            ORDER BY rowid
            "#,
        )
        .bind(join_code.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_players", e))?;

        rows.iter().map(player_record).collect()
    }

    async fn get(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
    ) -> Result<Option<PlayerRecord>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT player_id, name, sheet_json, inventory_json
            FROM session_players WHERE join_code = ? AND player_id = ?
            "#,
        )
        .bind(join_code.as_str())
        .bind(player_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("get_player", e))?;

        row.as_ref().map(player_record).transpose()
    }

    async fn upsert(&self, join_code: &JoinCode, record: &PlayerRecord) -> Result<(), RepoError> {
        self.write_player(join_code, record).await
    }

    async fn apply_stats_delta(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
        delta: &StatsDelta,
    ) -> Result<bool, RepoError> {
        let mut record = PlayerRepo::get(self, join_code, player_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Player", player_id))?;

        let changed = record
            .sheet
            .as_mut()
            .is_some_and(|sheet| sheet.apply_delta(delta));
        if changed {
            self.write_player(join_code, &record).await?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use tavern_domain::{NpcId, RoleAndRollSheet, RoleAndRollVitals, SceneId};

    async fn store(dir: &tempfile::TempDir) -> SqliteSessionStore {
        let path = dir.path().join("sessions.db");
        SqliteSessionStore::new(
            path.to_str().unwrap(),
            Arc::new(FixedClock(Utc::now())),
        )
        .await
        .unwrap()
    }

    fn code() -> JoinCode {
        JoinCode::new("ABCD").unwrap()
    }

    #[tokio::test]
    async fn scene_patch_keeps_npcs_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store
            .create(&SessionState::new(code(), Utc::now()))
            .await
            .unwrap();

        store
            .save(
                &code(),
                &SessionStatePatch::new().with_active_npcs(vec![NpcId::new("n1")]),
            )
            .await
            .unwrap();
        store
            .save(
                &code(),
                &SessionStatePatch::new().with_scene(Some(SceneId::new("scene-2"))),
            )
            .await
            .unwrap();

        let loaded = store.load(&code()).await.unwrap().unwrap();
        assert_eq!(loaded.current_scene_id(), Some(&SceneId::new("scene-2")));
        assert_eq!(loaded.active_npcs(), &[NpcId::new("n1")]);
    }

    #[tokio::test]
    async fn corrupt_active_npcs_column_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        sqlx::query(
            "INSERT INTO sessions (join_code, active_npcs, status, updated_at) VALUES ('ABCD', 'not json', 'ACTIVE', ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();

        let loaded = store.load(&code()).await.unwrap().unwrap();
        assert!(loaded.active_npcs().is_empty());
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        assert!(store.load(&code()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let state = SessionState::new(code(), Utc::now());
        store.create(&state).await.unwrap();

        assert!(store.create(&state).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn archive_persists_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store
            .create(&SessionState::new(code(), Utc::now()))
            .await
            .unwrap();

        store.archive(&code()).await.unwrap();

        let loaded = store.load(&code()).await.unwrap().unwrap();
        assert!(loaded.is_archived());
        let patch = SessionStatePatch::new().with_scene(None);
        assert!(store.save(&code(), &patch).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn stats_delta_updates_stored_role_and_roll_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let record = PlayerRecord {
            player_id: PlayerId::new("p1"),
            name: "Ana".to_string(),
            sheet: Some(CharacterSheet::RoleAndRoll(RoleAndRollSheet {
                vitals: RoleAndRollVitals {
                    health: 3,
                    mental: 2,
                    will_power: 1,
                },
                attributes: Default::default(),
                abilities: Default::default(),
            })),
            inventory: Inventory::new(),
        };
        store.upsert(&code(), &record).await.unwrap();

        let delta = StatsDelta {
            health: Some(-5),
            ..Default::default()
        };
        store
            .apply_stats_delta(&code(), &PlayerId::new("p1"), &delta)
            .await
            .unwrap();

        let players = store.list_for_session(&code()).await.unwrap();
        assert_eq!(players.len(), 1);
        let Some(CharacterSheet::RoleAndRoll(sheet)) = &players[0].sheet else {
            panic!("expected role and roll sheet");
        };
        assert_eq!(sheet.vitals.health, 0);
        assert_eq!(sheet.vitals.mental, 2);
    }
}
