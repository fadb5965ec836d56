//! Tavern Engine - Main entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tavern_engine::{
    api::{self, WsState},
    app::Repositories,
    infrastructure::{
        campaigns::JsonCampaignCatalog,
        channels::ChannelHub,
        clock::SystemClock,
        ports::{CampaignRepo, ClockPort},
    },
    App, EngineConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (Taskfile runs the engine from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tavern_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tavern Engine");

    // Load configuration
    let config = EngineConfig::from_env();

    // Create clock for repositories
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    let campaigns: Arc<dyn CampaignRepo> = match &config.campaign_data_path {
        Some(path) => Arc::new(JsonCampaignCatalog::load(path).await?),
        None => {
            tracing::warn!("CAMPAIGN_DATA_PATH not set, starting with no campaigns");
            Arc::new(JsonCampaignCatalog::empty())
        }
    };

    let repositories = match &config.session_db {
        Some(path) => {
            tracing::info!(path = %path, "Using SQLite session store");
            Repositories::sqlite(path, campaigns, clock).await?
        }
        None => {
            tracing::warn!("SESSION_DB not set, sessions are kept in memory only");
            Repositories::in_memory(campaigns, clock)
        }
    };

    // Create application
    let hub = Arc::new(ChannelHub::new(config.channel_capacity));
    let app = Arc::new(App::new(repositories, hub));

    // Create WebSocket state
    let ws_state = Arc::new(WsState::new(app.clone()));

    let mut router = api::build_router(app, ws_state);
    if let Some(cors) = config.cors_layer() {
        router = router.layer(cors);
    }

    // Start server
    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
