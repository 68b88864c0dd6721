//! Lobby and player models plus the membership mutation rules.

use std::{collections::VecDeque, time::SystemTime};

use indexmap::IndexMap;
use rand::Rng;
use uuid::Uuid;

use crate::{error::ServiceError, quiz::models::Difficulty};

/// Maximum number of chat entries retained for replay to late joiners.
pub const CHAT_HISTORY_LIMIT: usize = 50;

/// Alphabet used for generated lobby codes.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Per-lobby gameplay settings fixed at creation time.
#[derive(Debug, Clone)]
pub struct LobbySettings {
    /// Minimum players required before the host can start.
    pub min_players: usize,
    /// Capacity bound enforced on joins.
    pub max_players: usize,
    /// Countdown per question in seconds.
    pub question_timer_secs: u64,
    /// Whether members must present a verified identity.
    pub require_auth: bool,
    /// Topic the question source draws from.
    pub category: String,
    /// Requested question difficulty.
    pub difficulty: Difficulty,
}

/// Lifecycle status of a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    /// Open for joins; no game running.
    Waiting,
    /// Start accepted; the game session is being prepared.
    Starting,
    /// A game session is active.
    InGame,
    /// The lobby was closed.
    Ended,
}

/// A member of a lobby.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable user identifier (from the identity provider or the client).
    pub user_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Active connection, or `None` while disconnected-but-retained.
    pub connection_id: Option<Uuid>,
    /// Ready flag toggled in the waiting room.
    pub ready: bool,
    /// Cumulative score across the current game session.
    pub score: u32,
    /// Join timestamp; drives host reassignment order.
    pub joined_at: SystemTime,
}

impl Player {
    /// Build a fresh player record with a zero score.
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            connection_id: None,
            ready: false,
            score: 0,
            joined_at: SystemTime::now(),
        }
    }
}

/// One retained chat message.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    /// Author user id.
    pub user_id: String,
    /// Author display name at send time.
    pub display_name: String,
    /// Message body.
    pub message: String,
    /// Server receive time.
    pub sent_at: SystemTime,
}

/// Outcome of an [`Lobby::add_player`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new player record was appended.
    Joined,
    /// The user was already a member; the call was an idempotent rejoin.
    Rejoined,
}

/// A named, capacity-bounded group of players identified by a short code.
#[derive(Debug, Clone)]
pub struct Lobby {
    /// Short unique code; primary key.
    pub code: String,
    /// User id of the current host.
    pub host_user_id: String,
    /// Members keyed by user id, ordered by join time.
    pub players: IndexMap<String, Player>,
    /// Lifecycle status.
    pub status: LobbyStatus,
    /// Fixed gameplay settings.
    pub settings: LobbySettings,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Bounded chat history replayed to late subscribers.
    pub chat_history: VecDeque<ChatEntry>,
}

impl Lobby {
    /// Create a lobby in `Waiting` with `host` as its sole member.
    pub fn new(code: impl Into<String>, host: Player, settings: LobbySettings) -> Self {
        let host_user_id = host.user_id.clone();
        let mut players = IndexMap::new();
        players.insert(host.user_id.clone(), host);

        Self {
            code: code.into(),
            host_user_id,
            players,
            status: LobbyStatus::Waiting,
            settings,
            created_at: SystemTime::now(),
            chat_history: VecDeque::new(),
        }
    }

    /// Add a player, enforcing status and capacity rules.
    ///
    /// Re-adding an existing member is an idempotent rejoin regardless of the
    /// lobby status, so a reconnecting player can re-enter mid-game.
    pub fn add_player(
        &mut self,
        user_id: &str,
        display_name: &str,
    ) -> Result<JoinOutcome, ServiceError> {
        if self.players.contains_key(user_id) {
            return Ok(JoinOutcome::Rejoined);
        }

        if self.status != LobbyStatus::Waiting {
            return Err(ServiceError::InvalidState(format!(
                "lobby `{}` is not accepting joins",
                self.code
            )));
        }

        if self.players.len() >= self.settings.max_players {
            return Err(ServiceError::Capacity(format!(
                "lobby `{}` already has {} players",
                self.code,
                self.players.len()
            )));
        }

        self.players
            .insert(user_id.to_string(), Player::new(user_id, display_name));
        Ok(JoinOutcome::Joined)
    }

    /// Remove a player, reassigning the host when the departing player held it.
    ///
    /// Returns `None` when the user was not a member (idempotent no-op).
    pub fn remove_player(&mut self, user_id: &str) -> Option<Player> {
        let removed = self.players.shift_remove(user_id)?;

        if self.host_user_id == user_id {
            self.reassign_host();
        }

        Some(removed)
    }

    /// Hand the host role to the longest-tenured remaining player.
    fn reassign_host(&mut self) {
        let next = self
            .players
            .values()
            .min_by_key(|player| player.joined_at)
            .map(|player| player.user_id.clone());

        if let Some(user_id) = next {
            self.host_user_id = user_id;
        }
    }

    /// Update a member's ready flag; returns `false` for non-members.
    pub fn set_ready(&mut self, user_id: &str, ready: bool) -> bool {
        match self.players.get_mut(user_id) {
            Some(player) => {
                player.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Bind or clear a member's active connection; returns `false` for non-members.
    pub fn set_connection(&mut self, user_id: &str, connection: Option<Uuid>) -> bool {
        match self.players.get_mut(user_id) {
            Some(player) => {
                player.connection_id = connection;
                true
            }
            None => false,
        }
    }

    /// Number of members with a live connection.
    pub fn connected_count(&self) -> usize {
        self.players
            .values()
            .filter(|player| player.connection_id.is_some())
            .count()
    }

    /// Whether `user_id` is a member.
    pub fn is_member(&self, user_id: &str) -> bool {
        self.players.contains_key(user_id)
    }

    /// Append a chat entry, discarding the oldest past the retention cap.
    pub fn push_chat(&mut self, entry: ChatEntry) {
        if self.chat_history.len() == CHAT_HISTORY_LIMIT {
            self.chat_history.pop_front();
        }
        self.chat_history.push_back(entry);
    }

    /// Reset scores and ready flags for a fresh game session.
    pub fn reset_for_new_game(&mut self) {
        for player in self.players.values_mut() {
            player.score = 0;
            player.ready = false;
        }
    }
}

/// Generate a human-shareable lobby code of `length` characters.
///
/// Uniqueness is the caller's responsibility (checked against the active
/// lobby index before use).
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}
