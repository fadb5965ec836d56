//! Tavern Player - terminal client for one GM or player.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tavern_player::{
    terminal::{self, Flow},
    BootstrapLoader, BootstrapOutcome, HttpBootstrapSource, PlayerConfig, SessionAdapter,
    WsTransport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tavern_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PlayerConfig::from_env().context("Invalid player configuration")?;
    tracing::info!(
        engine_url = %config.engine_url,
        join_code = %config.join_code,
        user_id = %config.user_id,
        role = %config.role,
        "Starting Tavern Player"
    );

    let transport = WsTransport::new(config.engine_url.clone());
    transport
        .connect()
        .await
        .with_context(|| format!("Could not reach engine at {}", config.engine_url))?;

    let adapter = SessionAdapter::new(
        config.identity(),
        &config.join_code,
        Arc::new(transport.clone()),
    );
    register_printers(&adapter).await;

    let source = HttpBootstrapSource::new(&config.http_base_url, config.bootstrap_timeout);
    let outcome = BootstrapLoader::new(Arc::new(source))
        .with_timeout(config.bootstrap_timeout)
        .join(&adapter)
        .await
        .context("Failed to join session")?;
    if let BootstrapOutcome::Degraded { reason } = &outcome {
        println!("Could not load the session ({reason}); starting from an empty board.");
    }
    println!("{}", terminal::render_scene(&adapter.game_state().await));

    if !config.identity().is_gm() {
        let character = adapter.own_character().await;
        adapter.join_game(character.as_ref()).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if adapter.is_kicked() {
            break;
        }
        let command = match terminal::parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match terminal::execute(&adapter, command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => println!("{e}"),
        }
    }

    adapter.disconnect().await;
    transport.disconnect().await;
    tracing::info!("Left session");
    Ok(())
}

async fn register_printers(adapter: &SessionAdapter) {
    adapter
        .on_player_action(|event| println!("{}", terminal::render_action(event)))
        .await;
    adapter
        .on_dice_result(|event| {
            if !event.live {
                println!("{}", terminal::render_roll(event));
            }
        })
        .await;
    adapter
        .on_whisper(|event| println!("{}", terminal::render_whisper(event)))
        .await;
    adapter
        .on_announcement(|event| println!("{}", terminal::render_announcement(event)))
        .await;
    adapter
        .on_roll_request(|event| println!("{}", terminal::render_roll_request(event)))
        .await;
    adapter
        .on_game_state(|state| println!("{}", terminal::render_scene(state)))
        .await;
    adapter
        .on_roster(|roster| {
            let names: Vec<&str> = roster.entries().iter().map(|e| e.name.as_str()).collect();
            println!("At the table: {}", names.join(", "));
        })
        .await;
    adapter
        .on_kicked(|_| println!("You were removed from the session. Press enter to exit."))
        .await;
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
