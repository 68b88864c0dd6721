//! Messages accepted from WebSocket clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Client-to-server messages, tagged by kind. Unknown kinds deserialize to
/// [`ClientMessage::Unknown`] so a newer client cannot kill the socket.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on every socket: bind the connection to an identity.
    Identify {
        /// Claimed user id (overridden by the verified token identity).
        user_id: String,
        /// Display name used in lobbies.
        display_name: String,
        /// Identity token, required when authentication is enforced.
        #[serde(default)]
        token: Option<String>,
    },
    /// Join (or rejoin) a lobby and subscribe to its events.
    JoinLobby {
        /// Target lobby code.
        lobby_code: String,
    },
    /// Leave a lobby and unsubscribe from its events.
    LeaveLobby {
        /// Target lobby code.
        lobby_code: String,
    },
    /// Start the game; host only.
    StartGame {
        /// Target lobby code.
        lobby_code: String,
    },
    /// Submit an answer for the live round.
    SubmitAnswer {
        /// Target lobby code.
        lobby_code: String,
        /// Submitted value.
        answer: String,
        /// Seconds left on the countdown as seen by the client.
        time_remaining: f64,
    },
    /// Send a chat message to the lobby.
    Chat {
        /// Target lobby code.
        lobby_code: String,
        /// Message body.
        message: String,
    },
    /// Anything this server version does not understand.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a message from its JSON text frame.
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
