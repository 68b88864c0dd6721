//! End-to-end gameplay scenarios over the service layer, using the
//! in-memory fanout and the paused Tokio clock to drive timers.

use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use quiz_arena_back::{
    config::AppConfig,
    dto::event::{EventEnvelope, ServerEvent},
    error::ServiceError,
    services::{answer_service, auth_service::Identity, lobby_service},
    state::{AppState, SharedState, fanout::lobby_topic, lobby::LobbyStatus},
};

fn fast_config() -> AppConfig {
    AppConfig {
        min_players_to_start: 1,
        max_players_per_lobby: 8,
        default_question_timer_secs: 30,
        total_questions: 2,
        reveal_grace_secs: 1,
        disconnect_drop_secs: 60,
        connection_idle_secs: 300,
        ai_timeout_secs: 1,
        require_authentication: false,
        lobby_code_length: 4,
        ai: None,
    }
}

fn identity(user: &str) -> Identity {
    Identity {
        user_id: user.into(),
        display_name: user.to_uppercase(),
    }
}

/// Simulate a live connection for a member so the all-answered close fires.
async fn bind_connection(state: &SharedState, code: &str, user: &str) {
    let cell = state.lobby_cell(code).expect("lobby exists");
    let mut locked = cell.lock().await;
    assert!(locked.lobby.set_connection(user, Some(Uuid::new_v4())));
}

async fn unbind_connection(state: &SharedState, code: &str, user: &str) {
    let cell = state.lobby_cell(code).expect("lobby exists");
    let mut locked = cell.lock().await;
    assert!(locked.lobby.set_connection(user, None));
}

/// The correct answer of the live question (server-side knowledge only).
async fn current_correct_answer(state: &SharedState, code: &str) -> String {
    let cell = state.lobby_cell(code).expect("lobby exists");
    let locked = cell.lock().await;
    locked
        .session
        .as_ref()
        .and_then(|session| session.current_question.as_ref())
        .map(|question| question.correct_answer.clone())
        .expect("a question is live")
}

/// Receive events until `pick` returns a value, skipping everything else.
async fn wait_for<T>(
    rx: &mut broadcast::Receiver<EventEnvelope>,
    pick: impl Fn(&EventEnvelope) -> Option<T>,
) -> T {
    for _ in 0..64 {
        let envelope = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("topic closed while waiting for event");
        if let Some(value) = pick(&envelope) {
            return value;
        }
    }
    panic!("expected event did not arrive");
}

#[tokio::test(start_paused = true)]
async fn solo_practice_game_runs_to_completion() {
    let state = AppState::new(fast_config());
    let alice = identity("alice");

    let summary = lobby_service::create_lobby(&state, &alice, Default::default())
        .await
        .unwrap();
    let code = summary.code.clone();
    assert_eq!(summary.host_user_id, "alice");

    let mut rx = state.fanout().subscribe(&lobby_topic(&code));
    bind_connection(&state, &code, "alice").await;

    let started = lobby_service::start_game(&state, &code, "alice").await.unwrap();
    assert_eq!(started.status, quiz_arena_back::dto::lobby::LobbyStatusDto::InGame);

    let total = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::GameStarted { total_questions } => Some(*total_questions),
        _ => None,
    })
    .await;
    assert_eq!(total, 2);

    let question = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::Question(q) => Some(q.clone()),
        _ => None,
    })
    .await;
    assert_eq!(question.question_index, 0);
    assert_eq!(question.time_secs, 30);

    // Round 1: correct answer with 20 of 30 seconds remaining.
    let correct = current_correct_answer(&state, &code).await;
    answer_service::submit_answer(&state, &code, "alice", &correct, 20.0)
        .await
        .unwrap();

    let result = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::AnswerResult(result) => {
            assert_eq!(envelope.target.as_deref(), Some("alice"));
            Some(result.clone())
        }
        _ => None,
    })
    .await;
    assert!(result.correct);
    assert!(result.points_awarded > 0);
    assert_eq!(result.correct_answer, correct);
    assert_eq!(result.leaderboard_delta.rank, 1);

    // Round 2 arrives after the reveal grace; answer it wrong.
    let question = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::Question(q) => Some(q.clone()),
        _ => None,
    })
    .await;
    assert_eq!(question.question_index, 1);

    answer_service::submit_answer(&state, &code, "alice", "definitely wrong", 10.0)
        .await
        .unwrap();

    let result = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::AnswerResult(result) => Some(result.clone()),
        _ => None,
    })
    .await;
    assert!(!result.correct);
    assert_eq!(result.points_awarded, 0);

    let ended = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::GameEnded(ended) => Some(ended.clone()),
        _ => None,
    })
    .await;
    assert_eq!(ended.winner_user_id.as_deref(), Some("alice"));
    assert!(ended.final_scores[0].score > 0);

    // The lobby is reusable for another game.
    let after = lobby_service::get_lobby(&state, &code).await.unwrap();
    assert_eq!(after.status, quiz_arena_back::dto::lobby::LobbyStatusDto::Waiting);
}

#[tokio::test(start_paused = true)]
async fn host_leave_reassigns_host_by_tenure() {
    let state = AppState::new(fast_config());
    let summary = lobby_service::create_lobby(&state, &identity("alice"), Default::default())
        .await
        .unwrap();
    let code = summary.code.clone();

    lobby_service::join_lobby(&state, &code, &identity("bob"), None)
        .await
        .unwrap();
    lobby_service::join_lobby(&state, &code, &identity("carol"), None)
        .await
        .unwrap();

    let mut rx = state.fanout().subscribe(&lobby_topic(&code));

    let outcome = lobby_service::leave_lobby(&state, &code, "alice").await.unwrap();
    assert!(!outcome.closed);
    let lobby = outcome.lobby.unwrap();
    assert_eq!(lobby.host_user_id, "bob");
    assert_eq!(lobby.players.len(), 2);

    let host = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::LobbyUpdate(update) => Some(update.host_user_id.clone()),
        _ => None,
    })
    .await;
    assert_eq!(host, "bob");
}

#[tokio::test(start_paused = true)]
async fn fully_disconnected_round_still_reaches_game_end() {
    let config = AppConfig {
        total_questions: 1,
        // Longer than two rounds so the retention drop never interferes.
        disconnect_drop_secs: 600,
        ..fast_config()
    };
    let state = AppState::new(config);

    let summary = lobby_service::create_lobby(&state, &identity("alice"), Default::default())
        .await
        .unwrap();
    let code = summary.code.clone();
    lobby_service::join_lobby(&state, &code, &identity("bob"), None)
        .await
        .unwrap();

    bind_connection(&state, &code, "alice").await;
    bind_connection(&state, &code, "bob").await;

    let mut rx = state.fanout().subscribe(&lobby_topic(&code));
    lobby_service::start_game(&state, &code, "alice").await.unwrap();

    wait_for(&mut rx, |envelope| {
        matches!(&envelope.event, ServerEvent::Question(_)).then_some(())
    })
    .await;

    // Everyone vanishes mid-round; nobody ever answers.
    unbind_connection(&state, &code, "alice").await;
    unbind_connection(&state, &code, "bob").await;

    // The round closes via timer expiry with zero recorded answers.
    let round = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::RoundResult(round) => Some(round.clone()),
        _ => None,
    })
    .await;
    assert!(round.scoreboard.iter().all(|entry| entry.score == 0));

    let ended = wait_for(&mut rx, |envelope| match &envelope.event {
        ServerEvent::GameEnded(ended) => Some(ended.clone()),
        _ => None,
    })
    .await;
    assert_eq!(ended.final_scores.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn membership_rules_hold_under_repeated_calls() {
    let config = AppConfig {
        max_players_per_lobby: 2,
        min_players_to_start: 2,
        ..fast_config()
    };
    let state = AppState::new(config);

    let summary = lobby_service::create_lobby(&state, &identity("alice"), Default::default())
        .await
        .unwrap();
    let code = summary.code.clone();

    // Starting below the minimum fails and leaves the status unchanged.
    let err = lobby_service::start_game(&state, &code, "alice").await.unwrap_err();
    assert!(matches!(err, ServiceError::Precondition(_)));
    {
        let cell = state.lobby_cell(&code).unwrap();
        let locked = cell.lock().await;
        assert_eq!(locked.lobby.status, LobbyStatus::Waiting);
    }

    // Join is idempotent; capacity binds strangers only.
    lobby_service::join_lobby(&state, &code, &identity("bob"), None)
        .await
        .unwrap();
    let again = lobby_service::join_lobby(&state, &code, &identity("bob"), None)
        .await
        .unwrap();
    assert_eq!(again.players.len(), 2);

    let err = lobby_service::join_lobby(&state, &code, &identity("carol"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Capacity(_)));

    // Leaving as a non-member is a no-op.
    let outcome = lobby_service::leave_lobby(&state, &code, "carol").await.unwrap();
    assert!(!outcome.closed);
    assert_eq!(outcome.lobby.unwrap().players.len(), 2);

    // Starting as a non-host is rejected.
    let err = lobby_service::start_game(&state, &code, "bob").await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));
}

#[tokio::test(start_paused = true)]
async fn duplicate_answers_are_rejected_first_write_wins() {
    let state = AppState::new(fast_config());
    let summary = lobby_service::create_lobby(&state, &identity("alice"), Default::default())
        .await
        .unwrap();
    let code = summary.code.clone();

    lobby_service::join_lobby(&state, &code, &identity("bob"), None)
        .await
        .unwrap();
    bind_connection(&state, &code, "alice").await;
    bind_connection(&state, &code, "bob").await;

    lobby_service::start_game(&state, &code, "alice").await.unwrap();

    answer_service::submit_answer(&state, &code, "alice", "first", 25.0)
        .await
        .unwrap();
    let err = answer_service::submit_answer(&state, &code, "alice", "second", 20.0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Duplicate(_)));

    {
        let cell = state.lobby_cell(&code).unwrap();
        let locked = cell.lock().await;
        let session = locked.session.as_ref().unwrap();
        assert_eq!(session.answers.get("alice").unwrap().submitted_value, "first");
        assert_eq!(session.answers.len(), 1);
    }

    // Bob answers too: every connected player answered, so the round closes
    // without waiting for the timer and further submissions are rejected.
    answer_service::submit_answer(&state, &code, "bob", "late but fine", 18.0)
        .await
        .unwrap();
    let err = answer_service::submit_answer(&state, &code, "bob", "again", 17.0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}
