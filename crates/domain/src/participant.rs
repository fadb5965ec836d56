//! Session participants and the recipient visibility rule.
//!
//! Roles and user ids come from the external auth collaborator. The relay
//! takes them at face value: visibility filtering is enforced by honest
//! receivers, not by the transport.

use serde::{Deserialize, Serialize};

use crate::ids::PlayerId;

/// Display name used for GM broadcasts that carry no actor id.
pub const GAME_MASTER_NAME: &str = "Game Master";

/// Role of a participant in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Game master - sole writer of the shared board, sees everything
    Gm,
    /// Player - controls one character
    #[default]
    Player,
}

impl SessionRole {
    pub fn is_gm(&self) -> bool {
        matches!(self, SessionRole::Gm)
    }
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRole::Gm => write!(f, "GM"),
            SessionRole::Player => write!(f, "Player"),
        }
    }
}

impl std::str::FromStr for SessionRole {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gm" | "dm" | "game_master" => Ok(Self::Gm),
            "player" => Ok(Self::Player),
            other => Err(crate::DomainError::parse(format!("Unknown role: {other}"))),
        }
    }
}

/// Who a client adapter is acting as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: PlayerId,
    pub display_name: String,
    pub role: SessionRole,
}

impl Identity {
    pub fn gm(user_id: impl Into<PlayerId>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: GAME_MASTER_NAME.to_string(),
            role: SessionRole::Gm,
        }
    }

    pub fn player(user_id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role: SessionRole::Player,
        }
    }

    pub fn is_gm(&self) -> bool {
        self.role.is_gm()
    }

    /// Accept if there is no target, the target is this participant, or this
    /// participant is the GM.
    pub fn can_view(&self, target: Option<&PlayerId>) -> bool {
        match target {
            None => true,
            Some(target) => self.is_gm() || target == &self.user_id,
        }
    }
}

/// Audience of a routed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Everyone on the channel.
    Public,
    /// The addressed player, the sender (when a player sent it) and the GM.
    Targeted {
        target: PlayerId,
        actor: Option<PlayerId>,
    },
    /// A private player action: the acting player and the GM.
    ActorOnly(PlayerId),
    /// Only the GM (a private action with no known actor).
    GmOnly,
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }

    pub fn visible_to(&self, viewer: &Identity) -> bool {
        match self {
            Visibility::Public => true,
            Visibility::Targeted { target, actor } => {
                viewer.can_view(Some(target)) || actor.as_ref() == Some(&viewer.user_id)
            }
            Visibility::ActorOnly(actor) => viewer.can_view(Some(actor)),
            Visibility::GmOnly => viewer.is_gm(),
        }
    }
}
