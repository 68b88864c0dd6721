//! Event envelope carried on lobby fanout topics and toward clients.
//!
//! The same shape flows over the fanout channel and down each WebSocket, so
//! any instance can relay a topic verbatim to its local connections.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::lobby::{LobbyStatusDto, PlayerSummary};

/// A fanout message: an event plus optional per-player targeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// When set, only the connection of this user id should receive the
    /// event; other subscribers drop it during relay.
    pub target: Option<String>,
    /// The event payload delivered to clients.
    pub event: ServerEvent,
}

impl EventEnvelope {
    /// Wrap an event addressed to every member of the lobby.
    pub fn broadcast(event: ServerEvent) -> Self {
        Self {
            target: None,
            event,
        }
    }

    /// Wrap an event addressed to a single player.
    pub fn targeted(user_id: impl Into<String>, event: ServerEvent) -> Self {
        Self {
            target: Some(user_id.into()),
            event,
        }
    }
}

/// Server-to-client events, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection identified and registered.
    ConnectionReady(ConnectionReadyEvent),
    /// Lobby membership, status, or host changed.
    LobbyUpdate(LobbyUpdateEvent),
    /// The lobby was torn down.
    LobbyClosed {
        /// Code of the closed lobby.
        lobby_code: String,
    },
    /// The caller left a lobby.
    LobbyLeft {
        /// Code of the lobby that was left.
        lobby_code: String,
    },
    /// A game session started.
    GameStarted {
        /// Number of questions the session will play.
        total_questions: usize,
    },
    /// A question went live. Never carries the correct answer.
    Question(QuestionEvent),
    /// A player submitted an answer (value withheld).
    PlayerAnswered {
        /// Submitting player.
        user_id: String,
    },
    /// A submission was accepted (direct ack to the submitter).
    AnswerAccepted {
        /// Question the answer was recorded for.
        question_index: usize,
    },
    /// Per-player round outcome, delivered at reveal time.
    AnswerResult(AnswerResultEvent),
    /// Aggregate round outcome for the whole lobby.
    RoundResult(RoundResultEvent),
    /// Final standings; the session is over.
    GameEnded(GameEndedEvent),
    /// A chat message in the lobby.
    ChatMessage(ChatMessageEvent),
    /// An operation failed; mirrors the REST error taxonomy.
    Error(ErrorEvent),
}

/// Sent once a WebSocket identified itself successfully.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionReadyEvent {
    /// Server-assigned connection id.
    pub connection_id: String,
    /// Identity the connection was bound to.
    pub user_id: String,
}

/// Broadcast whenever lobby membership or status changes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LobbyUpdateEvent {
    /// Lobby code.
    pub lobby_code: String,
    /// Members ordered by join time.
    pub players: Vec<PlayerSummary>,
    /// Lifecycle status.
    pub status: LobbyStatusDto,
    /// Current host.
    pub host_user_id: String,
}

/// Broadcast when a question goes live.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionEvent {
    /// Question text.
    pub text: String,
    /// Options for multiple choice; empty for free text.
    pub options: Vec<String>,
    /// Countdown in seconds.
    pub time_secs: u64,
    /// Zero-based question index.
    pub question_index: usize,
    /// Total questions in the session.
    pub total_questions: usize,
}

/// Change in the leaderboard produced by one round result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardDelta {
    /// New cumulative score after the round.
    pub new_total: u32,
    /// One-based rank after the round.
    pub rank: usize,
}

/// Per-player outcome delivered during the reveal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerResultEvent {
    /// Whether the submission counted as correct.
    pub correct: bool,
    /// Points awarded for the round.
    pub points_awarded: u32,
    /// The correct answer, revealed now that the round closed.
    pub correct_answer: String,
    /// Effect of the round on the player's standing.
    pub leaderboard_delta: LeaderboardDelta,
}

/// One row of a scoreboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoreboardEntry {
    /// Player user id.
    pub user_id: String,
    /// Player display name.
    pub display_name: String,
    /// Cumulative score.
    pub score: u32,
}

/// Aggregate outcome of a round.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoundResultEvent {
    /// Zero-based question index the result belongs to.
    pub question_index: usize,
    /// The correct answer.
    pub correct_answer: String,
    /// Standings after the round, best first.
    pub scoreboard: Vec<ScoreboardEntry>,
}

/// Final standings published when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GameEndedEvent {
    /// Final standings, best first.
    pub final_scores: Vec<ScoreboardEntry>,
    /// Winner, absent when the lobby emptied before the end.
    pub winner_user_id: Option<String>,
}

/// Chat message relayed to the lobby.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessageEvent {
    /// Author user id.
    pub user_id: String,
    /// Author display name.
    pub display_name: String,
    /// Message body.
    pub message: String,
    /// RFC3339 server receive time.
    pub sent_at: String,
}

/// Error surfaced over the real-time transport.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEvent {
    /// Machine-readable error kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}
