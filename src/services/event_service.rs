//! Typed event builders and fanout publishing with bounded retry.

use std::time::Duration;

use tracing::warn;

use crate::{
    dto::{
        event::{
            ChatMessageEvent, EventEnvelope, LobbyUpdateEvent, QuestionEvent, ScoreboardEntry,
            ServerEvent,
        },
        format_system_time,
    },
    state::{SharedState, fanout::lobby_topic, lobby::Lobby},
};

const PUBLISH_ATTEMPTS: u32 = 3;
const PUBLISH_BACKOFF: Duration = Duration::from_millis(50);

/// Publish an envelope to a lobby topic, retrying with bounded backoff.
///
/// A publish that keeps failing is logged and dropped rather than aborting
/// the in-progress game; clients resynchronize from the next update.
pub async fn publish(state: &SharedState, code: &str, envelope: EventEnvelope) {
    let topic = lobby_topic(code);
    let mut backoff = PUBLISH_BACKOFF;

    for attempt in 1..=PUBLISH_ATTEMPTS {
        match state.fanout().publish(topic.clone(), envelope.clone()).await {
            Ok(_) => return,
            Err(err) if attempt < PUBLISH_ATTEMPTS => {
                warn!(code, attempt, error = %err, "fanout publish failed; retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => {
                warn!(code, error = %err, "fanout publish failed; event dropped");
            }
        }
    }
}

/// Publish an event addressed to every member of the lobby.
pub async fn publish_event(state: &SharedState, code: &str, event: ServerEvent) {
    publish(state, code, EventEnvelope::broadcast(event)).await;
}

/// Publish an event addressed to a single player.
pub async fn publish_to_player(state: &SharedState, code: &str, user_id: &str, event: ServerEvent) {
    publish(state, code, EventEnvelope::targeted(user_id, event)).await;
}

/// Build a `lobby_update` event from the authoritative lobby state.
pub fn lobby_update_event(lobby: &Lobby) -> ServerEvent {
    ServerEvent::LobbyUpdate(LobbyUpdateEvent {
        lobby_code: lobby.code.clone(),
        players: lobby.players.values().map(Into::into).collect(),
        status: lobby.status.into(),
        host_user_id: lobby.host_user_id.clone(),
    })
}

/// Publish a `lobby_update` for the current membership/status.
pub async fn publish_lobby_update(state: &SharedState, lobby: &Lobby) {
    publish_event(state, &lobby.code, lobby_update_event(lobby)).await;
}

/// Build a `question` event, stripping the correct answer.
pub fn question_event(
    text: &str,
    options: &[String],
    time_secs: u64,
    question_index: usize,
    total_questions: usize,
) -> ServerEvent {
    ServerEvent::Question(QuestionEvent {
        text: text.to_string(),
        options: options.to_vec(),
        time_secs,
        question_index,
        total_questions,
    })
}

/// Current standings, best first; ties keep join order.
pub fn scoreboard(lobby: &Lobby) -> Vec<ScoreboardEntry> {
    let mut entries: Vec<ScoreboardEntry> = lobby
        .players
        .values()
        .map(|player| ScoreboardEntry {
            user_id: player.user_id.clone(),
            display_name: player.display_name.clone(),
            score: player.score,
        })
        .collect();
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.score));
    entries
}

/// Build a chat event from a stored entry.
pub fn chat_event(entry: &crate::state::lobby::ChatEntry) -> ServerEvent {
    ServerEvent::ChatMessage(ChatMessageEvent {
        user_id: entry.user_id.clone(),
        display_name: entry.display_name.clone(),
        message: entry.message.clone(),
        sent_at: format_system_time(entry.sent_at),
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        quiz::models::Difficulty,
        state::lobby::{LobbySettings, Player},
    };

    use super::*;

    fn lobby_with_scores(scores: &[(&str, u32)]) -> Lobby {
        let settings = LobbySettings {
            min_players: 1,
            max_players: 8,
            question_timer_secs: 30,
            require_auth: false,
            category: "General".into(),
            difficulty: Difficulty::Basic,
        };
        let mut lobby = Lobby::new("ABCD", Player::new(scores[0].0, scores[0].0), settings);
        for (user, _) in &scores[1..] {
            lobby.add_player(user, user).unwrap();
        }
        for (user, score) in scores {
            lobby.players.get_mut(*user).unwrap().score = *score;
        }
        lobby
    }

    #[test]
    fn scoreboard_sorts_best_first_with_stable_ties() {
        let lobby = lobby_with_scores(&[("alice", 50), ("bob", 120), ("carol", 50)]);
        let board = scoreboard(&lobby);

        let order: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        // bob leads; alice keeps join-order precedence over carol on the tie.
        assert_eq!(order, vec!["bob", "alice", "carol"]);
    }

    #[test]
    fn question_event_never_carries_the_answer() {
        let event = question_event("Q?", &["a".into(), "b".into()], 30, 0, 5);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("correct"));
        assert!(json.contains("\"type\":\"question\""));
    }
}
