//! Session adapter for one GM or player client
//!
//! The adapter owns everything a single client needs on a session channel:
//! - typed senders that stamp ids and actor fields before publishing
//! - one callback slot per event category (a later registration replaces
//!   the earlier one; an adapter backs exactly one UI surface)
//! - id de-duplication and visibility filtering on receipt
//! - the local [`GameState`] derived from the bootstrap snapshot and events
//!
//! Callbacks run on the adapter's dispatch task, never inside the publish
//! call that caused the event.
//!
//! When the transport re-subscribes after an outage the adapter reloads the
//! snapshot (keeping its log and the ids it has seen) and, if it had joined,
//! announces itself again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use tavern_domain::{
    CharacterRuntimeState, Identity, ItemDescriptor, ItemId, JoinCode, NpcId, PlayerId,
    PooledRoll, RollRequest, Roster, RosterEntry, SceneId, StandardRoll, StatsDelta,
};
use tavern_shared::{
    channel_name, classify_or_passthrough, ActionType, BootstrapSnapshot, EventEnvelope,
    InventoryChange, RollOutcome, SessionEvent,
};

use crate::application::dto::{
    AnnouncementEvent, DiceResultEvent, EventOrigin, InventoryEvent, PlayerActionEvent,
    PrivateSceneEvent, RollRequestEvent, StatsEvent, WhisperEvent,
};
use crate::application::services::BootstrapLoader;
use crate::ports::outbound::{ChannelDelivery, ChannelTransport, EventStream, TransportError};
use crate::state::{GameState, LogEntry, LogKind, PrivateScene, RecentIds};

pub type Callback<T> = Box<dyn Fn(&T) + Send + Sync + 'static>;

#[derive(Default)]
struct Callbacks {
    game_state: Option<Callback<GameState>>,
    player_action: Option<Callback<PlayerActionEvent>>,
    dice_result: Option<Callback<DiceResultEvent>>,
    whisper: Option<Callback<WhisperEvent>>,
    private_scene: Option<Callback<PrivateSceneEvent>>,
    announcement: Option<Callback<AnnouncementEvent>>,
    roll_request: Option<Callback<RollRequestEvent>>,
    inventory: Option<Callback<InventoryEvent>>,
    stats: Option<Callback<StatsEvent>>,
    roster: Option<Callback<Roster>>,
    kicked: Option<Callback<PlayerId>>,
}

enum Notification {
    GameState(GameState),
    PlayerAction(PlayerActionEvent),
    DiceResult(DiceResultEvent),
    Whisper(WhisperEvent),
    PrivateScene(PrivateSceneEvent),
    Announcement(AnnouncementEvent),
    RollRequest(RollRequestEvent),
    Inventory(InventoryEvent),
    Stats(StatsEvent),
    Roster(Roster),
    Kicked(PlayerId),
}

impl Callbacks {
    fn notify(&self, notification: &Notification) {
        fn call<T>(slot: &Option<Callback<T>>, value: &T) {
            if let Some(callback) = slot {
                callback(value);
            }
        }

        match notification {
            Notification::GameState(v) => call(&self.game_state, v),
            Notification::PlayerAction(v) => call(&self.player_action, v),
            Notification::DiceResult(v) => call(&self.dice_result, v),
            Notification::Whisper(v) => call(&self.whisper, v),
            Notification::PrivateScene(v) => call(&self.private_scene, v),
            Notification::Announcement(v) => call(&self.announcement, v),
            Notification::RollRequest(v) => call(&self.roll_request, v),
            Notification::Inventory(v) => call(&self.inventory, v),
            Notification::Stats(v) => call(&self.stats, v),
            Notification::Roster(v) => call(&self.roster, v),
            Notification::Kicked(v) => call(&self.kicked, v),
        }
    }
}

struct AdapterState {
    recent: RecentIds,
    game: GameState,
}

/// State shared between the adapter handle and its dispatch task.
struct Shared {
    identity: Identity,
    transport: Arc<dyn ChannelTransport>,
    join_code: JoinCode,
    channel: String,
    state: Mutex<AdapterState>,
    callbacks: Mutex<Callbacks>,
    kicked: AtomicBool,
    /// Set once this client has announced itself with `JOIN_GAME`.
    joined: AtomicBool,
    /// Snapshot source used to catch up after a re-subscribe.
    resync: Mutex<Option<BootstrapLoader>>,
    sequence: AtomicU64,
}

impl Shared {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// `{timestampMillis}-{origin}-{sequence}`, unique per client.
    fn next_event_id(&self) -> String {
        format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            self.identity.user_id,
            self.next_sequence()
        )
    }

    async fn send(&self, mut event: EventEnvelope) -> String {
        event.normalize_tag();
        let id = match event.id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_event_id();
                event.id = Some(id.clone());
                id
            }
        };

        let identity = &self.identity;
        if event.actor_id.is_none() && event.actor_name.is_none() {
            let actor_id = (!identity.is_gm()).then_some(&identity.user_id);
            event = event.with_actor(actor_id, identity.display_name.clone());
        }

        if self.kicked.load(Ordering::SeqCst) {
            warn!(channel = %self.channel, event_id = %id, "Not publishing, client was kicked");
            return id;
        }

        let action_type = event.action().to_string();
        match self.transport.publish(&self.channel, event).await {
            Ok(()) => debug!(channel = %self.channel, event_id = %id, action_type = %action_type, "Event published"),
            Err(e) => warn!(
                channel = %self.channel,
                event_id = %id,
                action_type = %action_type,
                error = %e,
                "Failed to publish event"
            ),
        }
        id
    }

    async fn announce_join(&self, character: Option<&CharacterRuntimeState>) -> String {
        let payload = match character {
            Some(character) => json!({ "character": character }),
            None => json!({}),
        };
        let event = EventEnvelope::new(&ActionType::JoinGame).with_payload(payload);
        self.joined.store(true, Ordering::SeqCst);
        self.send(event).await
    }

    /// Catch up after the transport re-subscribed: reload the snapshot and
    /// take this client's roster seat back. A failed reload keeps the board.
    async fn resync(&self) {
        let loader = self.resync.lock().await.clone();
        if let Some(loader) = loader {
            let outcome = loader.fetch(&self.join_code, &self.identity).await;
            if let Some(snapshot) = outcome.snapshot() {
                let notifications = {
                    let mut state = self.state.lock().await;
                    state.game.hydrate(snapshot, &self.identity);
                    vec![
                        Notification::GameState(state.game.clone()),
                        Notification::Roster(state.game.roster.clone()),
                    ]
                };
                self.notify(notifications).await;
            }
        }

        if self.joined.load(Ordering::SeqCst) {
            let character = self
                .state
                .lock()
                .await
                .game
                .character(&self.identity.user_id)
                .cloned();
            let id = self.announce_join(character.as_ref()).await;
            debug!(channel = %self.channel, event_id = %id, "Re-announced after re-subscribe");
        }
    }

    async fn handle(&self, envelope: EventEnvelope) -> Vec<Notification> {
        let mut state = self.state.lock().await;

        let id = match envelope.id() {
            Some(id) => {
                if !state.recent.insert(id) {
                    debug!(event_id = %id, "Dropping duplicate event");
                    return Vec::new();
                }
                id.to_string()
            }
            None => format!("local-{}", self.next_sequence()),
        };

        let (classified, decode_error) = classify_or_passthrough(&envelope);
        if let Some(error) = decode_error {
            debug!(
                event_id = %id,
                action_type = %classified.action,
                error = %error,
                "Malformed event payload, treating as unrecognized"
            );
        }
        if !classified.visibility.visible_to(&self.identity) {
            trace!(event_id = %id, action_type = %classified.action, "Event not addressed to this client");
            return Vec::new();
        }

        let me = &self.identity;
        let private = !classified.visibility.is_public();
        let origin = EventOrigin {
            id,
            actor_id: envelope.actor(),
            actor_name: envelope
                .actor_name
                .clone()
                .filter(|name| !name.trim().is_empty()),
        };
        let game = &mut state.game;
        let mut out = Vec::new();

        match classified.event {
            SessionEvent::SceneChanged(change) => {
                let global = classified.action == ActionType::GmSetGlobalScene;
                game.apply_scene(&change, global);
                if let Some(scene_id) = &change.scene_id {
                    let name = game
                        .campaign
                        .scene(scene_id)
                        .map_or_else(|| scene_id.to_string(), |scene| scene.name.clone());
                    game.push_log(log_entry(&origin, LogKind::Scene, format!("Scene: {name}"), false));
                }
                out.push(Notification::GameState(game.clone()));
            }
            SessionEvent::PrivateScene {
                target,
                scene_id,
                scene_image_url,
            } => {
                let scene_image_url = scene_image_url
                    .or_else(|| scene_id.as_ref().and_then(|id| game.campaign_image(id)));
                if target == me.user_id {
                    game.set_private_scene(scene_id.clone(), scene_image_url.clone());
                    out.push(Notification::GameState(game.clone()));
                }
                out.push(Notification::PrivateScene(PrivateSceneEvent {
                    origin,
                    target,
                    scene: PrivateScene {
                        scene_id,
                        scene_image_url,
                    },
                }));
            }
            SessionEvent::Whisper { message } => {
                game.push_log(log_entry(&origin, LogKind::Whisper, message.clone(), true));
                out.push(Notification::Whisper(WhisperEvent {
                    origin,
                    target: envelope.target(),
                    message,
                }));
            }
            SessionEvent::RollRequested { request } => {
                let target = envelope.target();
                if !me.is_gm() && target.as_ref().map_or(true, |t| t == &me.user_id) {
                    game.pending_roll = Some(request.clone());
                }
                let text = format!("Roll requested: {} (DC {})", request.check_type, request.dc);
                game.push_log(log_entry(&origin, LogKind::System, text, private));
                out.push(Notification::RollRequest(RollRequestEvent {
                    origin,
                    target,
                    request,
                }));
            }
            SessionEvent::Rolled { outcome, live } => {
                if !live {
                    if origin.actor_id.as_ref() == Some(&me.user_id) {
                        game.pending_roll = None;
                    }
                    let text = describe_roll(&origin, &outcome);
                    game.push_log(log_entry(&origin, LogKind::Roll, text, false));
                }
                out.push(Notification::DiceResult(DiceResultEvent {
                    origin,
                    outcome,
                    live,
                }));
            }
            SessionEvent::Inventory { target, change } => {
                if game.apply_inventory(&target, &change) {
                    let text = match &change {
                        InventoryChange::Add(item) => format!("{target} received {}", item.name),
                        InventoryChange::Remove(item_id) => format!("{target} lost {item_id}"),
                    };
                    game.push_log(log_entry(&origin, LogKind::System, text, true));
                }
                out.push(Notification::Inventory(InventoryEvent {
                    origin,
                    target,
                    change,
                }));
            }
            SessionEvent::Stats { target, delta } => {
                game.apply_stats(&target, &delta);
                out.push(Notification::Stats(StatsEvent {
                    character: game.character(&target).cloned(),
                    origin,
                    target,
                    delta,
                }));
            }
            SessionEvent::PlayerJoined {
                player_id,
                name,
                character,
            } => {
                let track = me.is_gm() || player_id == me.user_id;
                let entry = RosterEntry {
                    player_id,
                    name: name.clone(),
                    character,
                };
                if game.join(entry, track) {
                    game.push_log(log_entry(&origin, LogKind::System, format!("{name} joined"), false));
                    out.push(Notification::Roster(game.roster.clone()));
                }
            }
            SessionEvent::PlayerKicked { player_id } => {
                if player_id == me.user_id && !me.is_gm() {
                    self.kicked.store(true, Ordering::SeqCst);
                    out.push(Notification::Kicked(player_id));
                } else if game.remove_player(&player_id) {
                    let text = format!("{player_id} was removed from the session");
                    game.push_log(log_entry(&origin, LogKind::System, text, false));
                    out.push(Notification::Roster(game.roster.clone()));
                }
            }
            SessionEvent::PlayerAction {
                kind,
                text,
                is_private,
            } => {
                let line = text.clone().unwrap_or_else(|| kind.clone());
                game.push_log(log_entry(&origin, LogKind::Action, line, is_private));
                out.push(Notification::PlayerAction(PlayerActionEvent {
                    origin,
                    kind,
                    text,
                    is_private,
                }));
            }
            SessionEvent::Announcement { message } => {
                game.push_log(log_entry(&origin, LogKind::Announcement, message.clone(), false));
                out.push(Notification::Announcement(AnnouncementEvent { origin, message }));
            }
            SessionEvent::Unrecognized => {
                let description = envelope
                    .description
                    .clone()
                    .filter(|d| !d.trim().is_empty());
                if let Some(text) = description {
                    game.push_log(log_entry(&origin, LogKind::Action, text, false));
                }
                debug!(event_id = %origin.id, action_type = %classified.action, "Unrecognized event passed through");
            }
        }

        out
    }

    async fn notify(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let callbacks = self.callbacks.lock().await;
        for notification in &notifications {
            callbacks.notify(notification);
        }
    }
}

fn log_entry(origin: &EventOrigin, kind: LogKind, text: String, private: bool) -> LogEntry {
    LogEntry {
        id: origin.id.clone(),
        kind,
        actor_name: Some(origin.display_name()),
        text,
        private,
    }
}

fn describe_roll(origin: &EventOrigin, outcome: &RollOutcome) -> String {
    let roller = match outcome {
        RollOutcome::Standard(roll) => roll.actor_name.clone(),
        RollOutcome::Pooled(roll) => roll.actor_name.clone(),
    }
    .unwrap_or_else(|| origin.display_name());
    let check = outcome.check_type().unwrap_or("a roll");
    match outcome {
        RollOutcome::Standard(roll) => match roll.succeeded() {
            Some(true) => format!("{roller} rolled {check}: {} (success)", roll.resolved_total()),
            Some(false) => format!("{roller} rolled {check}: {} (failure)", roll.resolved_total()),
            None => format!("{roller} rolled {check}: {}", roll.resolved_total()),
        },
        RollOutcome::Pooled(roll) => format!(
            "{roller} rolled {check}: {} ({} dice)",
            roll.total,
            roll.dice_count()
        ),
    }
}

/// One client's connection to a session channel.
pub struct SessionAdapter {
    shared: Arc<Shared>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl SessionAdapter {
    pub fn new(
        identity: Identity,
        join_code: &JoinCode,
        transport: Arc<dyn ChannelTransport>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                identity,
                transport,
                join_code: join_code.clone(),
                channel: channel_name(join_code),
                state: Mutex::new(AdapterState {
                    recent: RecentIds::new(),
                    game: GameState::new(),
                }),
                callbacks: Mutex::new(Callbacks::default()),
                kicked: AtomicBool::new(false),
                joined: AtomicBool::new(false),
                resync: Mutex::new(None),
                sequence: AtomicU64::new(0),
            }),
            dispatch: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.shared.identity
    }

    pub fn join_code(&self) -> &JoinCode {
        &self.shared.join_code
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    pub fn is_kicked(&self) -> bool {
        self.shared.kicked.load(Ordering::SeqCst)
    }

    pub async fn game_state(&self) -> GameState {
        self.shared.state.lock().await.game.clone()
    }

    /// This client's own character, if it has one.
    pub async fn own_character(&self) -> Option<CharacterRuntimeState> {
        self.shared
            .state
            .lock()
            .await
            .game
            .character(&self.shared.identity.user_id)
            .cloned()
    }

    /// Seed local state from a bootstrap snapshot. `None` leaves an empty board.
    pub async fn hydrate(&self, snapshot: Option<&BootstrapSnapshot>) {
        let mut state = self.shared.state.lock().await;
        match snapshot {
            Some(snapshot) => state.game.hydrate(snapshot, &self.shared.identity),
            None => state.game = GameState::new(),
        }
    }

    /// Use `loader` to reload the snapshot whenever the channel is
    /// re-subscribed after an outage.
    pub(crate) async fn resync_with(&self, loader: BootstrapLoader) {
        *self.shared.resync.lock().await = Some(loader);
    }

    /// Subscribe to the session channel and start dispatching events.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let shared = &self.shared;
        let stream = shared
            .transport
            .subscribe(&shared.channel, &shared.identity)
            .await?;
        let handle = tokio::spawn(run_dispatch(Arc::clone(shared), stream));

        if let Some(previous) = self.dispatch.lock().await.replace(handle) {
            previous.abort();
        }
        info!(channel = %shared.channel, user_id = %shared.identity.user_id, "Subscribed to session");
        Ok(())
    }

    /// Stop delivery. Local state is kept as it was.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.dispatch.lock().await.take() {
            handle.abort();
        }
        let channel = &self.shared.channel;
        if let Err(e) = self.shared.transport.unsubscribe(channel).await {
            warn!(channel = %channel, error = %e, "Failed to unsubscribe");
        }
    }

    // =========================================================================
    // Callback registration (one slot per category, last registration wins)
    // =========================================================================

    pub async fn on_game_state(&self, callback: impl Fn(&GameState) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.game_state = Some(Box::new(callback));
    }

    pub async fn on_player_action(
        &self,
        callback: impl Fn(&PlayerActionEvent) + Send + Sync + 'static,
    ) {
        self.shared.callbacks.lock().await.player_action = Some(Box::new(callback));
    }

    pub async fn on_dice_result(&self, callback: impl Fn(&DiceResultEvent) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.dice_result = Some(Box::new(callback));
    }

    pub async fn on_whisper(&self, callback: impl Fn(&WhisperEvent) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.whisper = Some(Box::new(callback));
    }

    pub async fn on_private_scene(
        &self,
        callback: impl Fn(&PrivateSceneEvent) + Send + Sync + 'static,
    ) {
        self.shared.callbacks.lock().await.private_scene = Some(Box::new(callback));
    }

    pub async fn on_announcement(
        &self,
        callback: impl Fn(&AnnouncementEvent) + Send + Sync + 'static,
    ) {
        self.shared.callbacks.lock().await.announcement = Some(Box::new(callback));
    }

    pub async fn on_roll_request(
        &self,
        callback: impl Fn(&RollRequestEvent) + Send + Sync + 'static,
    ) {
        self.shared.callbacks.lock().await.roll_request = Some(Box::new(callback));
    }

    pub async fn on_inventory(&self, callback: impl Fn(&InventoryEvent) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.inventory = Some(Box::new(callback));
    }

    pub async fn on_stats(&self, callback: impl Fn(&StatsEvent) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.stats = Some(Box::new(callback));
    }

    pub async fn on_roster(&self, callback: impl Fn(&Roster) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.roster = Some(Box::new(callback));
    }

    pub async fn on_kicked(&self, callback: impl Fn(&PlayerId) + Send + Sync + 'static) {
        self.shared.callbacks.lock().await.kicked = Some(Box::new(callback));
    }

    // =========================================================================
    // Senders
    // =========================================================================

    /// Stamp and publish an event. Returns the event id.
    ///
    /// Publishing is fire-and-forget: a transport failure is logged and the
    /// id is still returned.
    pub async fn send_action(&self, event: EventEnvelope) -> String {
        self.shared.send(event).await
    }

    /// Narrated player action (`move`, `attack`, `talk`, `inspect`, `custom`).
    pub async fn player_action(
        &self,
        action: ActionType,
        text: impl Into<String>,
        is_private: bool,
    ) -> String {
        let event = EventEnvelope::new(&action)
            .with_description(text)
            .with_payload(json!({ "isPrivate": is_private }));
        self.send_action(event).await
    }

    /// Ask one player, or every player when `target` is `None`, for a check.
    pub async fn request_roll(&self, target: Option<&PlayerId>, request: &RollRequest) -> String {
        let event = EventEnvelope::new(&ActionType::GmRequestRoll)
            .with_target(target)
            .with_payload(json!({ "checkType": request.check_type, "dc": request.dc }));
        self.send_action(event).await
    }

    /// Private message. Without a target only the sender and the GM see it.
    pub async fn whisper(&self, target: Option<&PlayerId>, message: impl Into<String>) -> String {
        let event = EventEnvelope::new(&ActionType::Whisper)
            .with_target(target)
            .with_payload(json!({ "message": message.into() }));
        self.send_action(event).await
    }

    pub async fn set_private_scene(&self, target: &PlayerId, scene_id: &SceneId) -> String {
        let image = self.scene_image(scene_id).await;
        let event = EventEnvelope::new(&ActionType::PrivateSceneUpdate)
            .with_target(Some(target))
            .with_payload(scene_payload(scene_id, image, None));
        self.send_action(event).await
    }

    pub async fn give_item(&self, target: &PlayerId, item: &ItemDescriptor) -> String {
        let event = EventEnvelope::new(&ActionType::GmManageInventory)
            .with_target(Some(target))
            .with_payload(json!({ "action": "add", "item": item }));
        self.send_action(event).await
    }

    pub async fn remove_item(&self, target: &PlayerId, item_id: &ItemId) -> String {
        let event = EventEnvelope::new(&ActionType::GmManageInventory)
            .with_target(Some(target))
            .with_payload(json!({ "action": "remove", "itemId": item_id }));
        self.send_action(event).await
    }

    /// Change the shared scene. `active_npcs: None` leaves the NPC list alone.
    pub async fn update_scene(&self, scene_id: &SceneId, active_npcs: Option<&[NpcId]>) -> String {
        let image = self.scene_image(scene_id).await;
        let event = EventEnvelope::new(&ActionType::GmUpdateScene)
            .with_payload(scene_payload(scene_id, image, active_npcs));
        self.send_action(event).await
    }

    pub async fn update_stats(&self, target: &PlayerId, delta: &StatsDelta) -> String {
        let event = EventEnvelope::new(&ActionType::StatsUpdate)
            .with_target(Some(target))
            .with_payload(json!({ "delta": delta }));
        self.send_action(event).await
    }

    pub async fn announce(&self, message: impl Into<String>) -> String {
        let event = EventEnvelope::new(&ActionType::Announce)
            .with_payload(json!({ "message": message.into() }));
        self.send_action(event).await
    }

    pub async fn roll_dice(&self, roll: &StandardRoll) -> String {
        let event = EventEnvelope::new(&ActionType::DiceRoll).with_payload(json!(roll));
        self.send_action(event).await
    }

    pub async fn pooled_roll(&self, roll: &PooledRoll) -> String {
        let event = EventEnvelope::new(&ActionType::RnrRoll).with_payload(json!(roll));
        self.send_action(event).await
    }

    /// Announce this client on the roster, with its character when it has one.
    ///
    /// The announcement is repeated after every re-subscribe, since the
    /// engine frees a seat when its connection drops.
    pub async fn join_game(&self, character: Option<&CharacterRuntimeState>) -> String {
        self.shared.announce_join(character).await
    }

    pub async fn kick_player(&self, target: &PlayerId) -> String {
        let event = EventEnvelope::new(&ActionType::PlayerKicked).with_target(Some(target));
        self.send_action(event).await
    }

    async fn scene_image(&self, scene_id: &SceneId) -> Option<String> {
        self.shared
            .state
            .lock()
            .await
            .game
            .campaign_image(scene_id)
    }
}

impl Drop for SessionAdapter {
    fn drop(&mut self) {
        if let Ok(mut dispatch) = self.dispatch.try_lock() {
            if let Some(handle) = dispatch.take() {
                handle.abort();
            }
        }
    }
}

fn scene_payload(scene_id: &SceneId, image: Option<String>, active_npcs: Option<&[NpcId]>) -> Value {
    let mut payload = json!({ "currentScene": scene_id });
    if let Some(image) = image {
        payload["sceneImageUrl"] = json!(image);
    }
    if let Some(npcs) = active_npcs {
        payload["activeNpcs"] = json!(npcs);
    }
    payload
}

async fn run_dispatch(shared: Arc<Shared>, mut stream: EventStream) {
    while let Some(delivery) = stream.recv().await {
        match delivery {
            ChannelDelivery::Event(envelope) => {
                let notifications = shared.handle(envelope).await;
                shared.notify(notifications).await;
            }
            ChannelDelivery::Resubscribed => {
                info!(channel = %shared.channel, "Channel re-subscribed, reloading session");
                shared.resync().await;
            }
        }

        if shared.kicked.load(Ordering::SeqCst) {
            info!(channel = %shared.channel, "Kicked from session, stopping dispatch");
            return;
        }
    }
    debug!(channel = %shared.channel, "Event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tavern_domain::{CharacterSheet, ItemType, StandardSheet};
    use tokio::sync::mpsc;

    use crate::infrastructure::loopback::LoopbackHub;

    fn code() -> JoinCode {
        JoinCode::new("ABCD").unwrap()
    }

    async fn connected(hub: &Arc<LoopbackHub>, identity: Identity) -> SessionAdapter {
        let adapter = SessionAdapter::new(identity, &code(), Arc::new(hub.connect()));
        adapter.connect().await.unwrap();
        adapter
    }

    async fn wait_for_log(adapter: &SessionAdapter, id: &str) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if adapter.game_state().await.log().any(|e| e.id == id) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("event never reached the log");
    }

    fn hero(player: &str, hp: i32) -> CharacterRuntimeState {
        CharacterRuntimeState::new(
            PlayerId::new(player),
            "Arden",
            CharacterSheet::Standard(StandardSheet {
                hp,
                max_hp: 10,
                mp: 0,
                max_mp: 0,
                will_power: 0,
                attributes: Default::default(),
            }),
        )
    }

    #[tokio::test]
    async fn own_events_echo_back_to_sender() {
        let hub = LoopbackHub::new();
        let player = connected(&hub, Identity::player("p1", "Ana")).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        player
            .on_player_action(move |event| {
                let _ = tx.send(event.origin.id.clone());
            })
            .await;

        let id = player.player_action(ActionType::Talk, "Hello", false).await;

        let echoed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(echoed, Some(id));
    }

    #[tokio::test]
    async fn sent_events_carry_stamped_id_and_actor() {
        let hub = LoopbackHub::new();
        let player = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            Arc::new(hub.connect()),
        );

        let first = player.player_action(ActionType::Move, "North", false).await;
        let second = player.player_action(ActionType::Move, "North", false).await;

        assert_ne!(first, second);
        assert!(first.ends_with("-p1-0"));
        let published = hub.published().await;
        assert_eq!(published[0].id(), Some(first.as_str()));
        assert_eq!(published[0].actor_id.as_deref(), Some("p1"));
        assert_eq!(published[0].actor_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn gm_broadcasts_have_no_actor_id() {
        let hub = LoopbackHub::new();
        let gm = SessionAdapter::new(Identity::gm("gm-1"), &code(), Arc::new(hub.connect()));

        gm.announce("Welcome").await;

        let published = hub.published().await;
        assert!(published[0].actor_id.is_none());
        assert_eq!(published[0].actor_name.as_deref(), Some("Game Master"));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_applied_once() {
        let hub = LoopbackHub::new();
        hub.set_duplicate_delivery(true);
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let player = connected(&hub, Identity::player("p1", "Ana")).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        player
            .on_announcement(move |event| {
                let _ = tx.send(event.message.clone());
            })
            .await;

        let first = gm.announce("Once").await;
        let sentinel = gm.announce("Done").await;
        wait_for_log(&player, &sentinel).await;

        let state = player.game_state().await;
        assert_eq!(state.log().filter(|e| e.id == first).count(), 1);
        assert_eq!(rx.recv().await.as_deref(), Some("Once"));
        assert_eq!(rx.recv().await.as_deref(), Some("Done"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn whisper_reaches_only_target_and_gm() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let p1 = connected(&hub, Identity::player("p1", "Ana")).await;
        let p2 = connected(&hub, Identity::player("p2", "Bo")).await;

        let whisper = gm
            .whisper(Some(&PlayerId::new("p1")), "you see a trap")
            .await;
        let sentinel = gm.announce("next").await;
        for adapter in [&gm, &p1, &p2] {
            wait_for_log(adapter, &sentinel).await;
        }

        let has_whisper = |state: &GameState| {
            state
                .log()
                .any(|e| e.id == whisper && e.text == "you see a trap")
        };
        assert!(has_whisper(&p1.game_state().await));
        assert!(has_whisper(&gm.game_state().await));
        assert!(!has_whisper(&p2.game_state().await));
    }

    #[tokio::test]
    async fn player_sees_own_whisper_to_the_gm() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let p1 = connected(&hub, Identity::player("p1", "Ana")).await;
        let p2 = connected(&hub, Identity::player("p2", "Bo")).await;

        let whisper = p1
            .whisper(Some(&PlayerId::new("gm-1")), "I pocket the ring")
            .await;
        let sentinel = p1.player_action(ActionType::Talk, "Nothing", false).await;
        for adapter in [&gm, &p1, &p2] {
            wait_for_log(adapter, &sentinel).await;
        }

        assert!(p1.game_state().await.log().any(|e| e.id == whisper));
        assert!(gm.game_state().await.log().any(|e| e.id == whisper));
        assert!(!p2.game_state().await.log().any(|e| e.id == whisper));
    }

    #[tokio::test]
    async fn private_action_is_seen_by_actor_and_gm() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let p1 = connected(&hub, Identity::player("p1", "Ana")).await;
        let p2 = connected(&hub, Identity::player("p2", "Bo")).await;

        let action = p1.player_action(ActionType::Inspect, "Checks the lock", true).await;
        let sentinel = gm.announce("next").await;
        for adapter in [&gm, &p1, &p2] {
            wait_for_log(adapter, &sentinel).await;
        }

        assert!(p1.game_state().await.log().any(|e| e.id == action));
        assert!(gm.game_state().await.log().any(|e| e.id == action));
        assert!(!p2.game_state().await.log().any(|e| e.id == action));
    }

    #[tokio::test]
    async fn roll_request_is_private_but_result_is_public() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let p1 = connected(&hub, Identity::player("p1", "Ana")).await;
        let p2 = connected(&hub, Identity::player("p2", "Bo")).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        p2.on_dice_result(move |event| {
            let _ = tx.send(event.outcome.total());
        })
        .await;

        let request_id = gm
            .request_roll(
                Some(&PlayerId::new("p1")),
                &RollRequest::new("STR Check", 15).unwrap(),
            )
            .await;
        wait_for_log(&p1, &request_id).await;
        assert_eq!(
            p1.game_state().await.pending_roll,
            Some(RollRequest::new("STR Check", 15).unwrap())
        );

        let roll_id = p1
            .roll_dice(&StandardRoll {
                check_type: "STR Check".to_string(),
                dc: Some(15),
                roll: 12,
                modifier: 3,
                total: Some(15),
                actor_name: None,
            })
            .await;
        for adapter in [&gm, &p1, &p2] {
            wait_for_log(adapter, &roll_id).await;
        }

        let p2_state = p2.game_state().await;
        assert!(p2_state.pending_roll.is_none());
        assert!(!p2_state.log().any(|e| e.id == request_id));
        assert!(p2_state
            .log()
            .any(|e| e.id == roll_id && e.text == "Ana rolled STR Check: 15 (success)"));
        assert!(p1.game_state().await.pending_roll.is_none());
        assert_eq!(rx.recv().await, Some(15));
    }

    #[tokio::test]
    async fn scene_update_merges_into_local_state() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let player = connected(&hub, Identity::player("p1", "Ana")).await;

        let first = gm
            .update_scene(&SceneId::new("scene-1"), Some(&[NpcId::new("npc-1")]))
            .await;
        wait_for_log(&player, &first).await;
        let second = gm.update_scene(&SceneId::new("scene-2"), None).await;
        wait_for_log(&player, &second).await;

        let state = player.game_state().await;
        assert_eq!(state.current_scene, Some(SceneId::new("scene-2")));
        assert_eq!(state.active_npcs, vec![NpcId::new("npc-1")]);
    }

    #[tokio::test]
    async fn stats_and_inventory_apply_to_tracked_characters() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let player = connected(&hub, Identity::player("p1", "Ana")).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        player
            .on_stats(move |event| {
                let _ = tx.send(event.character.clone());
            })
            .await;

        let join = player.join_game(Some(&hero("p1", 5))).await;
        wait_for_log(&gm, &join).await;

        let potion = ItemDescriptor::new("potion-1", "Potion", ItemType::Consumable).unwrap();
        gm.give_item(&PlayerId::new("p1"), &potion).await;
        let give_again = gm.give_item(&PlayerId::new("p1"), &potion).await;
        gm.update_stats(
            &PlayerId::new("p1"),
            &StatsDelta {
                hp: Some(-9999),
                ..Default::default()
            },
        )
        .await;

        let character = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .flatten()
            .unwrap();
        match &character.sheet {
            CharacterSheet::Standard(sheet) => assert_eq!(sheet.hp, 0),
            other => panic!("unexpected sheet {other:?}"),
        }
        assert_eq!(character.inventory.len(), 1);

        // The GM mirrors the same character.
        let sentinel = gm.announce("next").await;
        wait_for_log(&gm, &sentinel).await;
        let gm_view = gm.game_state().await;
        assert_eq!(
            gm_view.character(&PlayerId::new("p1")).unwrap().inventory.len(),
            1
        );
        assert!(!gm_view.log().any(|e| e.id == give_again));
    }

    #[tokio::test]
    async fn kicked_player_stops_dispatching() {
        let hub = LoopbackHub::new();
        let gm = connected(&hub, Identity::gm("gm-1")).await;
        let player = connected(&hub, Identity::player("p1", "Ana")).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        player
            .on_kicked(move |player_id| {
                let _ = tx.send(player_id.clone());
            })
            .await;

        let join = player.join_game(None).await;
        wait_for_log(&gm, &join).await;
        gm.kick_player(&PlayerId::new("p1")).await;

        let kicked = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(kicked, Some(PlayerId::new("p1")));
        assert!(player.is_kicked());

        let after = gm.announce("still there?").await;
        wait_for_log(&gm, &after).await;
        assert!(!player.game_state().await.log().any(|e| e.id == after));
        assert!(gm.game_state().await.roster.is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_events_do_not_stop_dispatch() {
        let hub = LoopbackHub::new();
        let transport = hub.connect();
        let player = connected(&hub, Identity::player("p1", "Ana")).await;

        let malformed: EventEnvelope = serde_json::from_value(json!({
            "id": "bad-1", "actionType": "STATS_UPDATE", "targetPlayerId": "p1"
        }))
        .unwrap();
        let unknown: EventEnvelope = serde_json::from_value(json!({
            "id": "emote-1", "type": "EMOTE", "description": "Ana waves"
        }))
        .unwrap();
        transport.publish(player.channel(), malformed).await.unwrap();
        transport.publish(player.channel(), unknown).await.unwrap();

        wait_for_log(&player, "emote-1").await;
        let state = player.game_state().await;
        assert!(state.log().any(|e| e.text == "Ana waves"));
    }

    #[tokio::test]
    async fn last_callback_registration_wins() {
        let hub = LoopbackHub::new();
        let player = connected(&hub, Identity::player("p1", "Ana")).await;
        let (first_tx, mut first_rx) = mpsc::unbounded_channel::<String>();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel::<String>();
        player
            .on_announcement(move |event| {
                let _ = first_tx.send(event.message.clone());
            })
            .await;
        player
            .on_announcement(move |event| {
                let _ = second_tx.send(event.message.clone());
            })
            .await;

        player.announce("hi").await;

        let received = tokio::time::timeout(Duration::from_secs(2), second_rx.recv())
            .await
            .unwrap();
        assert_eq!(received.as_deref(), Some("hi"));
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_failure_still_returns_id() {
        let mut transport = crate::ports::outbound::MockChannelTransport::new();
        transport
            .expect_publish()
            .returning(|_, _| Err(TransportError::NotConnected));
        let player = SessionAdapter::new(
            Identity::player("p1", "Ana"),
            &code(),
            Arc::new(transport),
        );

        let id = player.announce("anyone?").await;
        assert!(!id.is_empty());
    }
}
