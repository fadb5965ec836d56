use std::sync::Arc;

use tracing::{instrument, Span};

use tavern_domain::{CharacterRuntimeState, Identity, JoinCode, PlayerId, RosterEntry, Visibility};
use tavern_shared::{
    channel_name, classify_or_passthrough, join_code_from_channel, ActionType, EventEnvelope, InventoryChange,
    SceneChange, SessionEvent,
};

use crate::infrastructure::channels::ChannelHub;
use crate::infrastructure::ports::{PlayerRepo, RandomPort, SessionStateRepo};
use crate::stores::RosterStore;

/// Routes one inbound event.
///
/// Side effects never block the broadcast: a failed write is logged and the
/// event still goes out.
pub struct RouteEvent {
    session_state: Arc<dyn SessionStateRepo>,
    players: Arc<dyn PlayerRepo>,
    roster: Arc<RosterStore>,
    hub: Arc<ChannelHub>,
    random: Arc<dyn RandomPort>,
}

impl RouteEvent {
    pub fn new(
        session_state: Arc<dyn SessionStateRepo>,
        players: Arc<dyn PlayerRepo>,
        roster: Arc<RosterStore>,
        hub: Arc<ChannelHub>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            session_state,
            players,
            roster,
            hub,
            random,
        }
    }

    #[instrument(
        skip(self, sender, envelope),
        fields(
            channel = %channel,
            action_type = tracing::field::Empty,
            event_id = tracing::field::Empty,
        )
    )]
    pub async fn execute(
        &self,
        channel: &str,
        sender: &Identity,
        mut envelope: EventEnvelope,
    ) -> Result<RouteOutcome, RouteError> {
        let join_code = join_code_from_channel(channel)
            .map_err(|_| RouteError::InvalidChannel(channel.to_string()))?;

        envelope.normalize_tag();
        if envelope.id().is_none() {
            envelope.id = Some(self.random.event_id().to_string());
        }
        let event_id = envelope.id().unwrap_or_default().to_string();

        let (classified, decode_error) = classify_or_passthrough(&envelope);
        let span = Span::current();
        span.record("action_type", classified.action.as_str());
        span.record("event_id", event_id.as_str());

        if let Some(error) = decode_error {
            tracing::debug!(error = %error, "Malformed payload, passing event through");
        }

        if classified.action.is_gm_only() && !sender.is_gm() {
            tracing::warn!(
                user_id = %sender.user_id,
                "Dropping GM-only event from non-GM sender"
            );
            return Err(RouteError::Forbidden {
                action: classified.action,
            });
        }

        let persisted = self.apply(&join_code, &classified.event).await;
        // Join codes are case-insensitive; the hub is keyed by the canonical name.
        let recipients = self.hub.publish(&channel_name(&join_code), envelope);

        tracing::debug!(recipients, persisted, "Event routed");

        Ok(RouteOutcome {
            event_id,
            action: classified.action,
            visibility: classified.visibility,
            recipients,
            persisted,
        })
    }

    /// Durable and roster side effects. Returns whether a durable write
    /// succeeded.
    async fn apply(&self, join_code: &JoinCode, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::SceneChanged(change) => self.save_scene(join_code, change).await,
            SessionEvent::Stats { target, delta } => {
                self.roster
                    .update_character(join_code, target, |pc| pc.apply_stats(delta));
                match self
                    .players
                    .apply_stats_delta(join_code, target, delta)
                    .await
                {
                    Ok(changed) => {
                        tracing::debug!(player_id = %target, changed, "Stats delta stored");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            player_id = %target,
                            error = %e,
                            "Failed to store stats delta"
                        );
                        false
                    }
                }
            }
            SessionEvent::Inventory { target, change } => {
                self.roster
                    .update_character(join_code, target, |pc| apply_inventory(pc, change));
                false
            }
            SessionEvent::PlayerJoined {
                player_id,
                name,
                character,
            } => {
                let joined = self.roster.join(
                    join_code,
                    RosterEntry {
                        player_id: player_id.clone(),
                        name: name.clone(),
                        character: character.clone(),
                    },
                );
                if joined {
                    tracing::info!(join_code = %join_code, player_id = %player_id, "Player joined");
                }
                false
            }
            SessionEvent::PlayerKicked { player_id } => {
                self.kick(join_code, player_id);
                false
            }
            _ => false,
        }
    }

    async fn save_scene(&self, join_code: &JoinCode, change: &SceneChange) -> bool {
        let patch = change.to_patch();
        if patch.is_empty() {
            return false;
        }
        match self.session_state.save(join_code, &patch).await {
            Ok(state) => {
                tracing::info!(
                    join_code = %join_code,
                    scene_id = ?state.current_scene_id(),
                    "Session state updated"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    join_code = %join_code,
                    error = %e,
                    "Failed to persist session state, broadcasting anyway"
                );
                false
            }
        }
    }

    fn kick(&self, join_code: &JoinCode, player_id: &PlayerId) {
        if self.roster.remove(join_code, player_id).is_some() {
            tracing::info!(join_code = %join_code, player_id = %player_id, "Player kicked");
        }
    }
}

fn apply_inventory(pc: &mut CharacterRuntimeState, change: &InventoryChange) -> bool {
    match change {
        InventoryChange::Add(item) => pc.give_item(item.clone()),
        InventoryChange::Remove(item_id) => pc.remove_item(item_id).is_some(),
    }
}

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub event_id: String,
    pub action: ActionType,
    pub visibility: Visibility,
    /// Subscribers the event was handed to, sender included.
    pub recipients: usize,
    pub persisted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Not a session channel: {0}")]
    InvalidChannel(String),
    #[error("{action} requires the GM role")]
    Forbidden { action: ActionType },
}
