//! Lobby REST request and projection payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    config::{AppConfig, MAX_PLAYERS_CEILING},
    dto::{format_system_time, validation::validate_display_name},
    quiz::models::Difficulty,
    state::lobby::{Lobby, LobbySettings, LobbyStatus, Player},
};

/// Payload used to create a new lobby with the caller as host.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLobbyRequest {
    /// Stable user id of the creator.
    pub user_id: String,
    /// Display name of the creator.
    pub display_name: String,
    /// Optional overrides for the lobby settings.
    #[serde(default)]
    pub settings: LobbySettingsInput,
}

impl Validate for CreateLobbyRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.user_id.trim().is_empty() {
            errors.add("user_id", validator::ValidationError::new("blank"));
        }
        if let Err(e) = validate_display_name(&self.display_name) {
            errors.add("display_name", e);
        }
        errors.merge_self("settings", self.settings.validate());

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Optional lobby settings accepted at creation; unset fields fall back to
/// the configured defaults.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct LobbySettingsInput {
    /// Minimum players required to start.
    #[validate(range(min = 1, max = 20))]
    pub min_players: Option<usize>,
    /// Lobby capacity.
    #[validate(range(min = 1, max = 20))]
    pub max_players: Option<usize>,
    /// Countdown per question in seconds.
    #[validate(range(min = 5, max = 300))]
    pub question_timer_secs: Option<u64>,
    /// Require a verified identity for join/submit.
    pub require_auth: Option<bool>,
    /// Topic the question source draws from.
    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,
    /// Question difficulty, 1 (basic) to 3 (advanced).
    #[validate(range(min = 1, max = 3))]
    pub difficulty: Option<u8>,
}

impl LobbySettingsInput {
    /// Resolve the input into concrete settings, applying configured
    /// defaults and cross-field checks.
    pub fn resolve(self, config: &AppConfig) -> Result<LobbySettings, String> {
        let max_players = self
            .max_players
            .unwrap_or(config.max_players_per_lobby)
            .min(MAX_PLAYERS_CEILING);
        let min_players = self.min_players.unwrap_or(config.min_players_to_start);

        if min_players > max_players {
            return Err(format!(
                "min_players ({min_players}) must not exceed max_players ({max_players})"
            ));
        }

        Ok(LobbySettings {
            min_players,
            max_players,
            question_timer_secs: self
                .question_timer_secs
                .unwrap_or(config.default_question_timer_secs),
            require_auth: self.require_auth.unwrap_or(config.require_authentication),
            category: self.category.unwrap_or_else(|| "General".into()),
            difficulty: self
                .difficulty
                .map(Difficulty::from_level)
                .unwrap_or(Difficulty::Intermediate),
        })
    }
}

/// Identity fields carried by join requests.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinLobbyRequest {
    /// Stable user id of the joiner.
    pub user_id: String,
    /// Display name of the joiner.
    pub display_name: String,
}

impl Validate for JoinLobbyRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.user_id.trim().is_empty() {
            errors.add("user_id", validator::ValidationError::new("blank"));
        }
        if let Err(e) = validate_display_name(&self.display_name) {
            errors.add("display_name", e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Identity-only payload used by leave/start requests.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ActionRequest {
    /// Stable user id of the caller.
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
}

/// Payload toggling the caller's ready flag.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReadyRequest {
    /// Stable user id of the caller.
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    /// Desired ready state.
    pub ready: bool,
}

/// Serialized lobby status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatusDto {
    /// Open for joins.
    Waiting,
    /// Game start in progress.
    Starting,
    /// Game session running.
    InGame,
    /// Lobby closed.
    Ended,
}

impl From<LobbyStatus> for LobbyStatusDto {
    fn from(status: LobbyStatus) -> Self {
        match status {
            LobbyStatus::Waiting => LobbyStatusDto::Waiting,
            LobbyStatus::Starting => LobbyStatusDto::Starting,
            LobbyStatus::InGame => LobbyStatusDto::InGame,
            LobbyStatus::Ended => LobbyStatusDto::Ended,
        }
    }
}

/// Public projection of a player exposed to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlayerSummary {
    /// Stable user id.
    pub user_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Ready flag.
    pub ready: bool,
    /// Whether the player currently has a live connection.
    pub connected: bool,
    /// Cumulative score for the running session.
    pub score: u32,
    /// RFC3339 join timestamp.
    pub joined_at: String,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            user_id: player.user_id.clone(),
            display_name: player.display_name.clone(),
            ready: player.ready,
            connected: player.connection_id.is_some(),
            score: player.score,
            joined_at: format_system_time(player.joined_at),
        }
    }
}

/// Effective lobby settings echoed back to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LobbySettingsDto {
    /// Minimum players required to start.
    pub min_players: usize,
    /// Lobby capacity.
    pub max_players: usize,
    /// Countdown per question in seconds.
    pub question_timer_secs: u64,
    /// Whether verified identities are required.
    pub require_auth: bool,
    /// Question topic.
    pub category: String,
    /// Question difficulty level, 1-3.
    pub difficulty: u8,
}

impl From<&LobbySettings> for LobbySettingsDto {
    fn from(settings: &LobbySettings) -> Self {
        Self {
            min_players: settings.min_players,
            max_players: settings.max_players,
            question_timer_secs: settings.question_timer_secs,
            require_auth: settings.require_auth,
            category: settings.category.clone(),
            difficulty: settings.difficulty.level(),
        }
    }
}

/// Response returned by the leave endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaveResponse {
    /// Whether the lobby was torn down because it became empty.
    pub closed: bool,
    /// The lobby after the leave, absent when it was closed.
    pub lobby: Option<LobbySummary>,
}

/// Projection of a lobby returned by REST endpoints and lobby updates.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LobbySummary {
    /// Short unique lobby code.
    pub code: String,
    /// Current host user id.
    pub host_user_id: String,
    /// Lifecycle status.
    pub status: LobbyStatusDto,
    /// Members ordered by join time.
    pub players: Vec<PlayerSummary>,
    /// Effective settings.
    pub settings: LobbySettingsDto,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl From<&Lobby> for LobbySummary {
    fn from(lobby: &Lobby) -> Self {
        Self {
            code: lobby.code.clone(),
            host_user_id: lobby.host_user_id.clone(),
            status: lobby.status.into(),
            players: lobby.players.values().map(PlayerSummary::from).collect(),
            settings: (&lobby.settings).into(),
            created_at: format_system_time(lobby.created_at),
        }
    }
}
