//! Lobby lifecycle: creation, membership, ready flags, start, teardown.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        event::ServerEvent,
        lobby::{LobbySettingsInput, LobbySummary},
        validation::normalize_lobby_code,
    },
    error::ServiceError,
    services::{auth_service::Identity, event_service, game_service},
    state::{
        ConnectionId, LobbyState, SharedState, drop_timer_key,
        fanout::lobby_topic,
        game::GameSession,
        lobby::{self, ChatEntry, Lobby, LobbyStatus, Player},
        lobby_timer_prefix,
        state_machine::{GameEvent, GamePhase},
    },
};

/// Upper bound on code-generation retries before giving up.
const MAX_CODE_ATTEMPTS: usize = 64;
/// Maximum accepted chat message length.
const MAX_CHAT_LENGTH: usize = 500;
/// Cap applied to lobby listings.
const LOBBY_LIST_LIMIT: usize = 20;

/// Result of a leave operation.
#[derive(Debug)]
pub struct LeaveOutcome {
    /// Whether the lobby was torn down because it became empty.
    pub closed: bool,
    /// Projection of the lobby after the leave, absent when closed.
    pub lobby: Option<LobbySummary>,
}

/// Create a lobby with the caller as sole player and host.
pub async fn create_lobby(
    state: &SharedState,
    identity: &Identity,
    settings: LobbySettingsInput,
) -> Result<LobbySummary, ServiceError> {
    let settings = settings
        .resolve(state.config())
        .map_err(ServiceError::InvalidInput)?;

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = lobby::generate_code(state.config().lobby_code_length);
        if state.contains_lobby(&code) {
            continue;
        }

        let host = Player::new(&identity.user_id, &identity.display_name);
        let lobby = Lobby::new(&code, host, settings.clone());
        let summary = LobbySummary::from(&lobby);
        let cell = Arc::new(Mutex::new(LobbyState::new(lobby)));

        // A concurrent creation may have claimed the code since the check.
        if !state.insert_lobby(&code, cell) {
            continue;
        }

        info!(code = %code, host = %identity.user_id, "lobby created");
        return Ok(summary);
    }

    Err(ServiceError::InvalidState(
        "could not allocate a unique lobby code".into(),
    ))
}

/// Join (or idempotently rejoin) a lobby, optionally binding a connection.
pub async fn join_lobby(
    state: &SharedState,
    code: &str,
    identity: &Identity,
    connection: Option<ConnectionId>,
) -> Result<LobbySummary, ServiceError> {
    let code = normalize_lobby_code(code);
    let cell = state
        .lobby_cell(&code)
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{code}` not found")))?;
    let mut locked = cell.lock().await;

    let outcome = locked
        .lobby
        .add_player(&identity.user_id, &identity.display_name)?;

    if let Some(connection) = connection {
        locked.lobby.set_connection(&identity.user_id, Some(connection));
        // A quick reconnect cancels the pending retention drop.
        state
            .timers()
            .disarm(&drop_timer_key(&code, &identity.user_id));
    }

    info!(code = %code, user = %identity.user_id, ?outcome, "player joined lobby");
    event_service::publish_lobby_update(state, &locked.lobby).await;
    Ok(LobbySummary::from(&locked.lobby))
}

/// Leave a lobby. Leaving a non-existent membership (or an already torn-down
/// lobby) is a no-op.
pub async fn leave_lobby(
    state: &SharedState,
    code: &str,
    user_id: &str,
) -> Result<LeaveOutcome, ServiceError> {
    let code = normalize_lobby_code(code);
    let Some(cell) = state.lobby_cell(&code) else {
        debug!(code = %code, user = user_id, "leave for unknown lobby ignored");
        return Ok(LeaveOutcome {
            closed: true,
            lobby: None,
        });
    };
    let mut locked = cell.lock().await;
    remove_member_locked(state, &code, &mut locked, user_id).await
}

/// Remove a member under the lobby lock, handling host reassignment,
/// early round closure, and empty-lobby teardown.
async fn remove_member_locked(
    state: &SharedState,
    code: &str,
    locked: &mut LobbyState,
    user_id: &str,
) -> Result<LeaveOutcome, ServiceError> {
    if locked.lobby.remove_player(user_id).is_none() {
        return Ok(LeaveOutcome {
            closed: false,
            lobby: Some(LobbySummary::from(&locked.lobby)),
        });
    }

    info!(code = %code, user = user_id, "player left lobby");

    if locked.lobby.players.is_empty() {
        teardown_locked(state, code, locked).await;
        return Ok(LeaveOutcome {
            closed: true,
            lobby: None,
        });
    }

    // The departure may leave every remaining connected player answered.
    if let Err(err) = game_service::try_close_if_all_answered(state, locked).await {
        warn!(code = %code, error = %err, "failed to close round after departure");
    }

    event_service::publish_lobby_update(state, &locked.lobby).await;
    Ok(LeaveOutcome {
        closed: false,
        lobby: Some(LobbySummary::from(&locked.lobby)),
    })
}

/// Tear down an empty lobby: cancel its session and timers, close the topic,
/// and drop it from the active index.
async fn teardown_locked(state: &SharedState, code: &str, locked: &mut LobbyState) {
    info!(code = %code, "lobby empty; tearing down");

    if locked.machine.phase() != GamePhase::Idle {
        let _ = locked.machine.apply(GameEvent::Abort);
    }
    locked.session = None;
    locked.lobby.status = LobbyStatus::Ended;

    state.timers().release_prefix(&lobby_timer_prefix(code));
    event_service::publish_event(
        state,
        code,
        ServerEvent::LobbyClosed {
            lobby_code: code.to_string(),
        },
    )
    .await;
    state.fanout().drop_topic(&lobby_topic(code));
    state.remove_lobby(code);
}

/// Start the game: host-only, requires `Waiting` status and enough players.
pub async fn start_game(
    state: &SharedState,
    code: &str,
    user_id: &str,
) -> Result<LobbySummary, ServiceError> {
    let code = normalize_lobby_code(code);
    let cell = state
        .lobby_cell(&code)
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{code}` not found")))?;
    let mut locked = cell.lock().await;

    if locked.lobby.host_user_id != user_id {
        return Err(ServiceError::Unauthorized(
            "only the host can start the game".into(),
        ));
    }
    if locked.lobby.status != LobbyStatus::Waiting {
        return Err(ServiceError::Precondition(
            "lobby is not in the waiting state".into(),
        ));
    }
    let min_players = locked.lobby.settings.min_players;
    if locked.lobby.players.len() < min_players {
        return Err(ServiceError::Precondition(format!(
            "need at least {min_players} players to start"
        )));
    }

    locked.machine.apply(GameEvent::StartRequested)?;
    locked.lobby.status = LobbyStatus::Starting;
    locked.lobby.reset_for_new_game();
    let total_questions = state.config().total_questions;
    locked.session = Some(GameSession::new(&code, total_questions));

    info!(code = %code, host = user_id, total_questions, "game starting");
    event_service::publish_event(state, &code, ServerEvent::GameStarted { total_questions }).await;

    match game_service::begin_round(state, &mut locked, GameEvent::QuestionReady).await {
        Ok(()) => {
            locked.lobby.status = LobbyStatus::InGame;
            event_service::publish_lobby_update(state, &locked.lobby).await;
            Ok(LobbySummary::from(&locked.lobby))
        }
        Err(err) => {
            warn!(code = %code, error = %err, "game start failed; reverting to waiting");
            game_service::abort_game(state, &mut locked).await;
            Err(err)
        }
    }
}

/// Toggle a member's ready flag.
pub async fn set_ready(
    state: &SharedState,
    code: &str,
    user_id: &str,
    ready: bool,
) -> Result<LobbySummary, ServiceError> {
    let code = normalize_lobby_code(code);
    let cell = state
        .lobby_cell(&code)
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{code}` not found")))?;
    let mut locked = cell.lock().await;

    if !locked.lobby.set_ready(user_id, ready) {
        return Err(ServiceError::NotFound(format!(
            "user `{user_id}` is not a member of lobby `{code}`"
        )));
    }

    event_service::publish_lobby_update(state, &locked.lobby).await;
    Ok(LobbySummary::from(&locked.lobby))
}

/// Current projection of a lobby.
pub async fn get_lobby(state: &SharedState, code: &str) -> Result<LobbySummary, ServiceError> {
    let code = normalize_lobby_code(code);
    let cell = state
        .lobby_cell(&code)
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{code}` not found")))?;
    let locked = cell.lock().await;
    Ok(LobbySummary::from(&locked.lobby))
}

/// Waiting lobbies, newest first.
pub async fn list_lobbies(state: &SharedState) -> Vec<LobbySummary> {
    let mut lobbies = Vec::new();
    for (_, cell) in state.lobby_cells() {
        let locked = cell.lock().await;
        if locked.lobby.status == LobbyStatus::Waiting {
            lobbies.push(LobbySummary::from(&locked.lobby));
        }
    }

    // RFC3339 timestamps sort lexicographically.
    lobbies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    lobbies.truncate(LOBBY_LIST_LIMIT);
    lobbies
}

/// Relay a chat message to the lobby and retain it for replay.
pub async fn post_chat(
    state: &SharedState,
    code: &str,
    identity: &Identity,
    message: &str,
) -> Result<(), ServiceError> {
    let message = message.trim();
    if message.is_empty() || message.chars().count() > MAX_CHAT_LENGTH {
        return Err(ServiceError::InvalidInput(format!(
            "chat message must be 1-{MAX_CHAT_LENGTH} characters"
        )));
    }

    let code = normalize_lobby_code(code);
    let cell = state
        .lobby_cell(&code)
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{code}` not found")))?;
    let mut locked = cell.lock().await;

    if !locked.lobby.is_member(&identity.user_id) {
        return Err(ServiceError::NotFound(format!(
            "user `{}` is not a member of lobby `{code}`",
            identity.user_id
        )));
    }

    let entry = ChatEntry {
        user_id: identity.user_id.clone(),
        display_name: identity.display_name.clone(),
        message: message.to_string(),
        sent_at: std::time::SystemTime::now(),
    };
    let event = event_service::chat_event(&entry);
    locked.lobby.push_chat(entry);

    event_service::publish_event(state, &code, event).await;
    Ok(())
}

/// Retained chat history as replayable events, oldest first.
pub async fn chat_history(state: &SharedState, code: &str) -> Vec<ServerEvent> {
    let code = normalize_lobby_code(code);
    let Some(cell) = state.lobby_cell(&code) else {
        return Vec::new();
    };
    let locked = cell.lock().await;
    locked
        .lobby
        .chat_history
        .iter()
        .map(event_service::chat_event)
        .collect()
}

/// Handle a connection loss: retain the player, start the retention
/// countdown, and let the round close if everyone left answered.
pub async fn handle_disconnect(
    state: &SharedState,
    code: &str,
    user_id: &str,
    connection: ConnectionId,
) {
    let Some(cell) = state.lobby_cell(code) else {
        return;
    };
    let mut locked = cell.lock().await;

    // A newer socket may already have rebound the player.
    let still_bound = locked
        .lobby
        .players
        .get(user_id)
        .is_some_and(|player| player.connection_id == Some(connection));
    if !still_bound {
        return;
    }

    locked.lobby.set_connection(user_id, None);
    info!(code = %code, user = user_id, "player disconnected; seat retained");
    event_service::publish_lobby_update(state, &locked.lobby).await;

    let timer_state = Arc::clone(state);
    let timer_code = code.to_string();
    let timer_user = user_id.to_string();
    state.timers().arm(
        &drop_timer_key(code, user_id),
        state.config().disconnect_drop(),
        move || async move {
            drop_disconnected_player(timer_state, timer_code, timer_user).await;
        },
    );

    if let Err(err) = game_service::try_close_if_all_answered(state, &mut locked).await {
        warn!(code = %code, error = %err, "failed to close round after disconnect");
    }
}

/// Timer entry point: drop a player whose disconnect outlived the threshold,
/// via the normal leave path (host reassignment included).
async fn drop_disconnected_player(state: SharedState, code: String, user_id: String) {
    let Some(cell) = state.lobby_cell(&code) else {
        return;
    };
    let mut locked = cell.lock().await;

    let still_disconnected = locked
        .lobby
        .players
        .get(&user_id)
        .is_some_and(|player| player.connection_id.is_none());
    if !still_disconnected {
        return;
    }

    info!(code = %code, user = %user_id, "disconnect threshold passed; dropping player");
    if let Err(err) = remove_member_locked(&state, &code, &mut locked, &user_id).await {
        warn!(code = %code, user = %user_id, error = %err, "failed to drop disconnected player");
    }
}
