//! Join sequence for a (re)connecting client
//!
//! A late joiner rebuilds the board from the persisted snapshot, never from
//! events it missed. The loader fetches the snapshot first, hydrates the
//! adapter, and only then subscribes to the live channel. If the snapshot
//! cannot be had within the time box the client still subscribes, starting
//! from an empty board.
//!
//! The adapter keeps a clone of the loader and fetches again whenever its
//! channel is re-subscribed after a dropped connection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use tavern_domain::{Identity, JoinCode, SessionStatus};
use tavern_shared::BootstrapSnapshot;

use crate::application::services::SessionAdapter;
use crate::ports::outbound::{BootstrapSource, TransportError};

pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    Loaded(Box<BootstrapSnapshot>),
    /// No snapshot; the adapter starts from an empty board.
    Degraded { reason: String },
}

impl BootstrapOutcome {
    pub fn snapshot(&self) -> Option<&BootstrapSnapshot> {
        match self {
            Self::Loaded(snapshot) => Some(snapshot),
            Self::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

#[derive(Clone)]
pub struct BootstrapLoader {
    source: Arc<dyn BootstrapSource>,
    timeout: Duration,
}

impl BootstrapLoader {
    pub fn new(source: Arc<dyn BootstrapSource>) -> Self {
        Self {
            source,
            timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the snapshot, then hydrate the adapter, then subscribe.
    ///
    /// Only a subscribe failure is an error; a failed snapshot fetch
    /// degrades to an empty board.
    #[instrument(skip(self, adapter), fields(join_code = %adapter.join_code(), user_id = %adapter.identity().user_id))]
    pub async fn join(&self, adapter: &SessionAdapter) -> Result<BootstrapOutcome, TransportError> {
        let outcome = self.fetch(adapter.join_code(), adapter.identity()).await;
        adapter.hydrate(outcome.snapshot()).await;
        adapter.resync_with(self.clone()).await;
        adapter.connect().await?;
        Ok(outcome)
    }

    /// Fetch the snapshot within the time box. Never fails; a missing
    /// snapshot comes back as [`BootstrapOutcome::Degraded`].
    pub(crate) async fn fetch(&self, join_code: &JoinCode, identity: &Identity) -> BootstrapOutcome {
        match tokio::time::timeout(self.timeout, self.source.fetch(join_code)).await {
            Ok(Ok(snapshot)) => {
                if snapshot.status == SessionStatus::Archived {
                    warn!("Session has ended, the board is read-only");
                }
                let has_character = snapshot.player(&identity.user_id).is_some();
                info!(
                    players = snapshot.players.len(),
                    seated = snapshot.roster.len(),
                scenes = snapshot.campaign.scenes.len(),
                    active_npcs = snapshot.active_npcs.len(),
                    has_character,
                    "Loaded session snapshot"
                );
                BootstrapOutcome::Loaded(Box::new(snapshot))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Bootstrap fetch failed, starting with an empty board");
                BootstrapOutcome::Degraded {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Bootstrap timed out, starting with an empty board"
                );
                BootstrapOutcome::Degraded {
                    reason: format!("timed out after {}ms", self.timeout.as_millis()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use tokio::sync::mpsc;

    use tavern_domain::{
        CharacterSheet, Identity, Inventory, JoinCode, NpcId, PlayerId, RoleAndRollSheet,
        RoleAndRollVitals, SceneId,
    };
    use tavern_shared::{ActionType, CampaignAssets, PlayerRecord};

    use crate::infrastructure::loopback::LoopbackHub;
    use crate::ports::outbound::{
        BootstrapFetchError, EventStream, MockBootstrapSource, MockChannelTransport,
    };

    fn code() -> JoinCode {
        JoinCode::new("ABCD").unwrap()
    }

    fn snapshot() -> BootstrapSnapshot {
        BootstrapSnapshot {
            join_code: "ABCD".to_string(),
            players: vec![PlayerRecord {
                player_id: PlayerId::new("p1"),
                name: "Ana".to_string(),
                sheet: Some(CharacterSheet::RoleAndRoll(RoleAndRollSheet {
                    vitals: RoleAndRollVitals {
                        health: 6,
                        mental: 4,
                        will_power: 2,
                    },
                    attributes: Default::default(),
                    abilities: Default::default(),
                })),
                inventory: Inventory::new(),
            }],
            roster: Vec::new(),
            campaign: CampaignAssets::default(),
            current_scene_id: Some(SceneId::new("scene-3")),
            scene_image_url: Some("cave.jpg".to_string()),
            active_npcs: vec![NpcId::new("npc-1")],
            status: SessionStatus::Active,
        }
    }

    struct SlowSource;

    #[async_trait]
    impl BootstrapSource for SlowSource {
        async fn fetch(&self, _: &JoinCode) -> Result<BootstrapSnapshot, BootstrapFetchError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(snapshot())
        }
    }

    #[tokio::test]
    async fn late_joiner_sees_npcs_from_snapshot() {
        let hub = LoopbackHub::new();
        let mut source = MockBootstrapSource::new();
        source
            .expect_fetch()
            .with(eq(code()))
            .times(1)
            .returning(|_| Ok(snapshot()));
        let adapter = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            Arc::new(hub.connect()),
        );

        let outcome = BootstrapLoader::new(Arc::new(source))
            .join(&adapter)
            .await
            .unwrap();

        assert!(!outcome.is_degraded());
        let state = adapter.game_state().await;
        assert_eq!(state.active_npcs, vec![NpcId::new("npc-1")]);
        assert_eq!(state.current_scene, Some(SceneId::new("scene-3")));
        assert!(adapter.own_character().await.is_some());
        assert_eq!(hub.subscriber_count("session-ABCD").await, 1);
    }

    #[tokio::test]
    async fn snapshot_is_fetched_before_subscribing() {
        let mut seq = Sequence::new();
        let mut source = MockBootstrapSource::new();
        let mut transport = MockChannelTransport::new();
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(snapshot()));
        transport
            .expect_subscribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(EventStream::new(mpsc::channel(1).1)));
        let adapter = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            Arc::new(transport),
        );

        BootstrapLoader::new(Arc::new(source))
            .join(&adapter)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_fetch_still_subscribes_with_empty_board() {
        let hub = LoopbackHub::new();
        let mut source = MockBootstrapSource::new();
        source
            .expect_fetch()
            .returning(|_| Err(BootstrapFetchError::Request("connection refused".into())));
        let adapter = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            Arc::new(hub.connect()),
        );

        let outcome = BootstrapLoader::new(Arc::new(source))
            .join(&adapter)
            .await
            .unwrap();

        assert!(outcome.is_degraded());
        assert!(adapter.game_state().await.active_npcs.is_empty());
        assert_eq!(hub.subscriber_count("session-ABCD").await, 1);
    }

    #[tokio::test]
    async fn slow_fetch_times_out_to_degraded() {
        let hub = LoopbackHub::new();
        let adapter = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            Arc::new(hub.connect()),
        );

        let outcome = BootstrapLoader::new(Arc::new(SlowSource))
            .with_timeout(Duration::from_millis(50))
            .join(&adapter)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BootstrapOutcome::Degraded {
                reason: "timed out after 50ms".to_string()
            }
        );
        assert_eq!(hub.subscriber_count("session-ABCD").await, 1);
    }

    #[tokio::test]
    async fn subscribe_failure_is_returned() {
        let mut source = MockBootstrapSource::new();
        source.expect_fetch().returning(|_| Ok(snapshot()));
        let mut transport = MockChannelTransport::new();
        transport
            .expect_subscribe()
            .returning(|_, _| Err(TransportError::NotConnected));
        let adapter = SessionAdapter::new(Identity::gm("gm-1"), &code(), Arc::new(transport));

        let result = BootstrapLoader::new(Arc::new(source)).join(&adapter).await;

        assert_eq!(result, Err(TransportError::NotConnected));
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn resubscribe_reloads_snapshot_and_rejoins() {
        let hub = LoopbackHub::new();
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let mut source = MockBootstrapSource::new();
        source.expect_fetch().times(2).returning(move |_| {
            let mut snapshot = snapshot();
            if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                // The GM moved on while the connection was down.
                snapshot.current_scene_id = Some(SceneId::new("scene-4"));
            }
            Ok(snapshot)
        });
        let transport = Arc::new(hub.connect());
        let adapter = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            transport.clone(),
        );
        BootstrapLoader::new(Arc::new(source))
            .join(&adapter)
            .await
            .unwrap();
        let character = adapter.own_character().await;
        adapter.join_game(character.as_ref()).await;
        let said = adapter
            .player_action(ActionType::Talk, "Hello", false)
            .await;
        let (adapter, hub, said) = (&adapter, &hub, &said);
        eventually(move || async move { adapter.game_state().await.log().any(|e| &e.id == said) })
            .await;

        transport.reconnect().await;

        eventually(move || async move {
            adapter.game_state().await.current_scene == Some(SceneId::new("scene-4"))
        })
        .await;
        eventually(move || async move {
            hub.published()
                .await
                .iter()
                .filter(|event| event.action() == ActionType::JoinGame)
                .count()
                == 2
        })
        .await;
        // Seated again once the second announcement echoes back.
        eventually(move || async move {
            adapter.game_state().await.roster.contains(&PlayerId::new("p1"))
        })
        .await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert!(adapter.game_state().await.log().any(|e| &e.id == said));
    }
}
