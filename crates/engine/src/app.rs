//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    campaigns::JsonCampaignCatalog,
    channels::ChannelHub,
    clock::{SystemClock, SystemRandom},
    memory::InMemorySessionStore,
    ports::{CampaignRepo, ClockPort, PlayerRepo, RandomPort, RepoError, SessionStateRepo},
    sqlite::SqliteSessionStore,
};
use crate::stores::RosterStore;
use crate::use_cases;

/// Main application state.
///
/// Holds the storage ports, the runtime stores and the use cases.
/// Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub repositories: Repositories,
    pub use_cases: UseCases,
    pub hub: Arc<ChannelHub>,
    pub roster: Arc<RosterStore>,
}

/// Container for the storage ports.
pub struct Repositories {
    pub session_state: Arc<dyn SessionStateRepo>,
    pub players: Arc<dyn PlayerRepo>,
    pub campaigns: Arc<dyn CampaignRepo>,
}

impl Repositories {
    /// Volatile storage; everything is lost on restart.
    pub fn in_memory(campaigns: Arc<dyn CampaignRepo>, clock: Arc<dyn ClockPort>) -> Self {
        let store = Arc::new(InMemorySessionStore::new(clock));
        Self {
            session_state: store.clone(),
            players: store,
            campaigns,
        }
    }

    /// SQLite-backed session and player storage.
    pub async fn sqlite(
        db_path: &str,
        campaigns: Arc<dyn CampaignRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, RepoError> {
        let store = Arc::new(SqliteSessionStore::new(db_path, clock).await?);
        Ok(Self {
            session_state: store.clone(),
            players: store,
            campaigns,
        })
    }

    /// In-memory storage with an empty campaign catalog.
    pub fn empty(clock: Arc<dyn ClockPort>) -> Self {
        Self::in_memory(Arc::new(JsonCampaignCatalog::empty()), clock)
    }
}

/// Container for all use cases.
pub struct UseCases {
    pub relay: use_cases::RelayUseCases,
    pub session: use_cases::SessionUseCases,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(repositories: Repositories, hub: Arc<ChannelHub>) -> Self {
        Self::with_ports(
            repositories,
            hub,
            Arc::new(SystemClock::new()),
            Arc::new(SystemRandom::new()),
        )
    }

    /// Same as [`App::new`] with injected time and randomness.
    pub fn with_ports(
        repositories: Repositories,
        hub: Arc<ChannelHub>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let roster = Arc::new(RosterStore::new());

        let relay = use_cases::RelayUseCases::new(Arc::new(use_cases::relay::RouteEvent::new(
            repositories.session_state.clone(),
            repositories.players.clone(),
            roster.clone(),
            hub.clone(),
            random.clone(),
        )));

        let session = use_cases::SessionUseCases::new(
            Arc::new(use_cases::session::StartSession::new(
                repositories.campaigns.clone(),
                repositories.session_state.clone(),
                clock,
                random,
            )),
            Arc::new(use_cases::session::EndSession::new(
                repositories.session_state.clone(),
                roster.clone(),
            )),
            Arc::new(use_cases::session::GetSession::new(
                repositories.session_state.clone(),
            )),
            Arc::new(use_cases::session::RegisterPlayer::new(
                repositories.session_state.clone(),
                repositories.players.clone(),
            )),
            Arc::new(use_cases::session::LoadBootstrap::new(
                repositories.session_state.clone(),
                repositories.players.clone(),
                repositories.campaigns.clone(),
                roster.clone(),
            )),
        );

        Self {
            repositories,
            use_cases: UseCases { relay, session },
            hub,
            roster,
        }
    }
}
