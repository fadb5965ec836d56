//! Line-oriented terminal front end.
//!
//! `/whisper <player|gm> <text>`, `/roll [<check> <dc> [player]]`,
//! `/scene <id>`, `/announce <text>`, `/kick <player>`, `/quit`, and
//! `/move`, `/attack`, `/inspect` or `/custom` followed by text. Anything
//! else is said out loud as a `talk` action.

use rand::Rng;
use thiserror::Error;

use tavern_domain::{PlayerId, RollRequest, SceneId, StandardRoll};
use tavern_shared::ActionType;

use crate::application::dto::{
    AnnouncementEvent, DiceResultEvent, PlayerActionEvent, RollRequestEvent, WhisperEvent,
};
use crate::application::services::SessionAdapter;
use crate::state::GameState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Only the GM can {0}")]
    GmOnly(&'static str),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action {
        action: ActionType,
        text: String,
    },
    /// `None` is addressed to the GM only.
    Whisper {
        target: Option<PlayerId>,
        message: String,
    },
    /// No arguments answers the pending request.
    Roll {
        request: Option<RollRequest>,
        target: Option<PlayerId>,
    },
    Scene(SceneId),
    Announce(String),
    Kick(PlayerId),
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Action {
            action: ActionType::Talk,
            text: line.to_string(),
        }));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Command::Quit,
        "move" | "attack" | "inspect" | "custom" | "say" => {
            if args.is_empty() {
                return Err(CommandError::Usage("/<action> <text>"));
            }
            let action = match name {
                "say" => ActionType::Talk,
                other => ActionType::parse(other),
            };
            Command::Action {
                action,
                text: args.to_string(),
            }
        }
        "whisper" | "w" => {
            let (target, message) = args
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage("/whisper <player|gm> <text>"))?;
            let target = match target {
                "gm" | "GM" => None,
                player => Some(PlayerId::new(player)),
            };
            Command::Whisper {
                target,
                message: message.trim().to_string(),
            }
        }
        "roll" | "r" => parse_roll(args)?,
        "scene" => {
            if args.is_empty() {
                return Err(CommandError::Usage("/scene <id>"));
            }
            Command::Scene(SceneId::new(args))
        }
        "announce" => {
            if args.is_empty() {
                return Err(CommandError::Usage("/announce <text>"));
            }
            Command::Announce(args.to_string())
        }
        "kick" => {
            if args.is_empty() {
                return Err(CommandError::Usage("/kick <player>"));
            }
            Command::Kick(PlayerId::new(args))
        }
        other => return Err(CommandError::Invalid(format!("Unknown command /{other}"))),
    };
    Ok(Some(command))
}

fn parse_roll(args: &str) -> Result<Command, CommandError> {
    const USAGE: &str = "/roll [<check> <dc> [player]]";

    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        [] => Ok(Command::Roll {
            request: None,
            target: None,
        }),
        [check, dc, rest @ ..] if rest.len() <= 1 => {
            let dc = dc.parse::<i32>().map_err(|_| CommandError::Usage(USAGE))?;
            let request =
                RollRequest::new(*check, dc).map_err(|e| CommandError::Invalid(e.to_string()))?;
            Ok(Command::Roll {
                request: Some(request),
                target: rest.first().map(|p| PlayerId::new(*p)),
            })
        }
        _ => Err(CommandError::Usage(USAGE)),
    }
}

/// Whether the input loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run a parsed command against the adapter.
///
/// A GM `/roll` asks for a check; a player `/roll` rolls a d20 and reports
/// it against the given or pending request.
pub async fn execute(adapter: &SessionAdapter, command: Command) -> Result<Flow, CommandError> {
    let is_gm = adapter.identity().is_gm();

    match command {
        Command::Quit => return Ok(Flow::Quit),
        Command::Action { action, text } => {
            adapter.player_action(action, text, false).await;
        }
        Command::Whisper { target, message } => {
            if is_gm && target.is_none() {
                return Err(CommandError::Usage("/whisper <player> <text>"));
            }
            adapter.whisper(target.as_ref(), message).await;
        }
        Command::Roll { request, target } if is_gm => {
            let request = request.ok_or(CommandError::Usage("/roll <check> <dc> [player]"))?;
            adapter.request_roll(target.as_ref(), &request).await;
        }
        Command::Roll { request, .. } => {
            let request = match request {
                Some(request) => Some(request),
                None => adapter.game_state().await.pending_roll,
            };
            let Some(request) = request else {
                return Err(CommandError::Invalid("No roll has been requested".to_string()));
            };
            let roll = StandardRoll {
                check_type: request.check_type,
                dc: Some(request.dc),
                roll: roll_d20(),
                modifier: 0,
                total: None,
                actor_name: Some(adapter.identity().display_name.clone()),
            };
            adapter.roll_dice(&roll).await;
        }
        Command::Scene(scene_id) => {
            if !is_gm {
                return Err(CommandError::GmOnly("change the scene"));
            }
            adapter.update_scene(&scene_id, None).await;
        }
        Command::Announce(message) => {
            if !is_gm {
                return Err(CommandError::GmOnly("make announcements"));
            }
            adapter.announce(message).await;
        }
        Command::Kick(player_id) => {
            if !is_gm {
                return Err(CommandError::GmOnly("remove players"));
            }
            adapter.kick_player(&player_id).await;
        }
    }
    Ok(Flow::Continue)
}

fn roll_d20() -> i32 {
    rand::thread_rng().gen_range(1..=20)
}

// =============================================================================
// Rendering
// =============================================================================

pub fn render_action(event: &PlayerActionEvent) -> String {
    let name = event.origin.display_name();
    let privacy = if event.is_private { " (private)" } else { "" };
    match &event.text {
        Some(text) if event.kind == ActionType::Talk.as_str() => {
            format!("{name}{privacy}: {text}")
        }
        Some(text) => format!("{name} [{}]{privacy}: {text}", event.kind),
        None => format!("{name} [{}]{privacy}", event.kind),
    }
}

pub fn render_whisper(event: &WhisperEvent) -> String {
    let to = event
        .target
        .as_ref()
        .map_or_else(|| "GM".to_string(), ToString::to_string);
    format!(
        "(whisper) {} -> {to}: {}",
        event.origin.display_name(),
        event.message
    )
}

pub fn render_roll(event: &DiceResultEvent) -> String {
    let roller = event.origin.display_name();
    let check = event.outcome.check_type().unwrap_or("a roll");
    let total = event.outcome.total();
    format!("{roller} rolled {check}: {total}")
}

pub fn render_roll_request(event: &RollRequestEvent) -> String {
    let who = event
        .target
        .as_ref()
        .map_or_else(|| "everyone".to_string(), ToString::to_string);
    format!(
        "Roll requested from {who}: {} (DC {}). Type /roll to answer.",
        event.request.check_type, event.request.dc
    )
}

pub fn render_announcement(event: &AnnouncementEvent) -> String {
    format!("*** {} ***", event.message)
}

pub fn render_scene(state: &GameState) -> String {
    let (scene_id, image) = state.visible_scene();
    let scene = scene_id.map_or_else(|| "(none)".to_string(), ToString::to_string);
    let mut line = format!("Scene: {scene}");
    if let Some(url) = image {
        line.push_str(&format!(" [{url}]"));
    }
    if !state.active_npcs.is_empty() {
        let npcs: Vec<&str> = state.active_npcs.iter().map(|n| n.as_str()).collect();
        line.push_str(&format!(" NPCs: {}", npcs.join(", ")));
    }
    line
}
