//! Round lifecycle driver: fetch, arm, close, reveal, advance or end.
//!
//! Every function here runs under the owning lobby's lock; timers re-enter
//! through the `handle_*` entry points, which take the lock themselves and
//! verify the captured round stamp before acting.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::{
    dto::event::{
        AnswerResultEvent, GameEndedEvent, LeaderboardDelta, RoundResultEvent, ServerEvent,
    },
    error::ServiceError,
    quiz::models::Question,
    services::{answer_service, event_service},
    state::{
        LobbyState, SharedState,
        lobby::{LobbySettings, LobbyStatus},
        round_timer_key,
        state_machine::{CloseReason, GameEvent, GamePhase, RoundStamp},
    },
};

/// Obtain the next question, preferring the AI source within a bounded
/// timeout and falling back to the stored pool on any failure.
async fn fetch_question(state: &SharedState, settings: &LobbySettings) -> Question {
    if let Some(source) = state.question_source().await {
        let bound = state.config().ai_timeout();
        match timeout(
            bound,
            source.next_question(settings.category.clone(), settings.difficulty),
        )
        .await
        {
            Ok(Ok(question)) => return question,
            Ok(Err(err)) => {
                warn!(error = %err, "question source failed; using fallback pool")
            }
            Err(_) => warn!("question source timed out; using fallback pool"),
        }
    }

    state.fallback_pool().next(settings.difficulty)
}

/// Open the next round: fetch a question, apply `event` to go live, arm the
/// countdown, and publish the question (without its answer).
pub(crate) async fn begin_round(
    state: &SharedState,
    locked: &mut LobbyState,
    event: GameEvent,
) -> Result<(), ServiceError> {
    let question = fetch_question(state, &locked.lobby.settings).await;
    let timer = Duration::from_secs(locked.lobby.settings.question_timer_secs);
    let time_secs = locked.lobby.settings.question_timer_secs;

    let session = locked
        .session
        .as_mut()
        .ok_or_else(|| ServiceError::InvalidState("no active game session".into()))?;
    session.begin_round(question.clone(), Instant::now() + timer);
    let question_index = session.question_index;
    let total_questions = session.total_questions;

    locked.machine.apply(event)?;
    let stamp = locked.machine.version();
    let code = locked.lobby.code.clone();

    let timer_state = Arc::clone(state);
    let timer_code = code.clone();
    state
        .timers()
        .arm(&round_timer_key(&code), timer, move || async move {
            handle_round_timeout(timer_state, timer_code, stamp).await;
        });

    info!(code = %code, question_index, origin = ?question.origin, "round started");
    event_service::publish_event(
        state,
        &code,
        event_service::question_event(
            &question.text,
            &question.options,
            time_secs,
            question_index,
            total_questions,
        ),
    )
    .await;

    Ok(())
}

/// Timer entry point: the countdown for a round elapsed.
///
/// Returns a boxed future so the mutually-recursive round/reveal timer chain
/// has a concrete `Send` type to anchor on, breaking rustc's opaque-future
/// auto-trait cycle.
pub fn handle_round_timeout(
    state: SharedState,
    code: String,
    stamp: RoundStamp,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(cell) = state.lobby_cell(&code) else {
            return;
        };
        let mut locked = cell.lock().await;

        if !locked.machine.is_current(stamp) || locked.machine.phase() != GamePhase::QuestionActive
        {
            debug!(code = %code, stamp, "stale round timer ignored");
            return;
        }

        if let Err(err) = close_round(&state, &mut locked, CloseReason::TimerExpired).await {
            warn!(code = %code, error = %err, "failed to close round on timer expiry");
        }
    })
}

/// Close the live round: score it, publish results, and arm the reveal grace.
pub(crate) async fn close_round(
    state: &SharedState,
    locked: &mut LobbyState,
    reason: CloseReason,
) -> Result<(), ServiceError> {
    locked.machine.apply(GameEvent::RoundClosed(reason))?;
    let code = locked.lobby.code.clone();
    // The countdown may still be pending when everyone answered early.
    state.timers().disarm(&round_timer_key(&code));

    let (question, question_index, answer_count) = {
        let session = locked
            .session
            .as_mut()
            .ok_or_else(|| ServiceError::InvalidState("no active game session".into()))?;
        session.close_round();
        let question = session
            .current_question
            .clone()
            .ok_or_else(|| ServiceError::InvalidState("round closed without a question".into()))?;
        (question, session.question_index, session.answers.len())
    };

    info!(code = %code, question_index, ?reason, answers = answer_count, "round closed");

    let results = answer_service::score_round(state, locked).await;
    for result in &results {
        if let Some(player) = locked.lobby.players.get_mut(&result.player_id) {
            player.score += result.points_awarded;
        }
    }

    let board = event_service::scoreboard(&locked.lobby);
    for result in &results {
        let Some(player) = locked.lobby.players.get(&result.player_id) else {
            continue;
        };
        let rank = board
            .iter()
            .position(|entry| entry.user_id == result.player_id)
            .map(|index| index + 1)
            .unwrap_or(board.len());

        event_service::publish_to_player(
            state,
            &code,
            &result.player_id,
            ServerEvent::AnswerResult(AnswerResultEvent {
                correct: result.correct,
                points_awarded: result.points_awarded,
                correct_answer: question.correct_answer.clone(),
                leaderboard_delta: LeaderboardDelta {
                    new_total: player.score,
                    rank,
                },
            }),
        )
        .await;
    }

    event_service::publish_event(
        state,
        &code,
        ServerEvent::RoundResult(RoundResultEvent {
            question_index,
            correct_answer: question.correct_answer.clone(),
            scoreboard: board,
        }),
    )
    .await;
    event_service::publish_lobby_update(state, &locked.lobby).await;

    let stamp = locked.machine.version();
    let timer_state = Arc::clone(state);
    let timer_code = code.clone();
    state.timers().arm(
        &round_timer_key(&code),
        state.config().reveal_grace(),
        move || async move {
            handle_reveal_elapsed(timer_state, timer_code, stamp).await;
        },
    );

    Ok(())
}

/// Timer entry point: the reveal grace elapsed; advance or end the game.
///
/// Boxed for the same reason as [`handle_round_timeout`]: it re-enters
/// [`begin_round`], so a concrete `Send` future type is needed to break the
/// recursive auto-trait cycle.
pub fn handle_reveal_elapsed(
    state: SharedState,
    code: String,
    stamp: RoundStamp,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(cell) = state.lobby_cell(&code) else {
            return;
        };
        let mut locked = cell.lock().await;

        if !locked.machine.is_current(stamp) || locked.machine.phase() != GamePhase::Revealing {
            debug!(code = %code, stamp, "stale reveal timer ignored");
            return;
        }

        let finished = locked
            .session
            .as_ref()
            .map(|session| session.is_last_question())
            .unwrap_or(true);

        if finished {
            if let Err(err) = finish_game(&state, &mut locked).await {
                warn!(code = %code, error = %err, "failed to finish game");
                abort_game(&state, &mut locked).await;
            }
            return;
        }

        if let Some(session) = locked.session.as_mut() {
            session.question_index += 1;
        }

        if let Err(err) = begin_round(&state, &mut locked, GameEvent::NextQuestion).await {
            // Forced progress: never leave a lobby stuck mid-game.
            warn!(code = %code, error = %err, "failed to start next round; ending game");
            abort_game(&state, &mut locked).await;
        }
    })
}

/// Close out the game: publish final standings and return the lobby to
/// `Waiting` so it can host another session.
pub(crate) async fn finish_game(
    state: &SharedState,
    locked: &mut LobbyState,
) -> Result<(), ServiceError> {
    locked.machine.apply(GameEvent::Finish)?;
    let code = locked.lobby.code.clone();

    let final_scores = event_service::scoreboard(&locked.lobby);
    let winner_user_id = final_scores.first().map(|entry| entry.user_id.clone());
    info!(code = %code, winner = ?winner_user_id, "game ended");

    event_service::publish_event(
        state,
        &code,
        ServerEvent::GameEnded(GameEndedEvent {
            final_scores,
            winner_user_id,
        }),
    )
    .await;

    locked.session = None;
    locked.lobby.status = LobbyStatus::Waiting;
    for player in locked.lobby.players.values_mut() {
        player.ready = false;
    }
    locked.machine.apply(GameEvent::Abort)?;
    event_service::publish_lobby_update(state, &locked.lobby).await;

    Ok(())
}

/// Hard-reset a lobby's game without standings, used on unrecoverable
/// mid-game failures and on teardown.
pub(crate) async fn abort_game(state: &SharedState, locked: &mut LobbyState) {
    if locked.machine.phase() != GamePhase::Idle {
        let _ = locked.machine.apply(GameEvent::Abort);
    }
    locked.session = None;
    locked.lobby.status = LobbyStatus::Waiting;
    event_service::publish_lobby_update(state, &locked.lobby).await;
}

/// Close the round early when every currently-connected player has answered.
///
/// With nobody connected the round is left to the countdown, so a fully
/// disconnected lobby still completes via timer expiry.
pub(crate) async fn try_close_if_all_answered(
    state: &SharedState,
    locked: &mut LobbyState,
) -> Result<bool, ServiceError> {
    if locked.machine.phase() != GamePhase::QuestionActive {
        return Ok(false);
    }

    let connected: Vec<String> = locked
        .lobby
        .players
        .values()
        .filter(|player| player.connection_id.is_some())
        .map(|player| player.user_id.clone())
        .collect();
    if connected.is_empty() {
        return Ok(false);
    }

    let Some(session) = locked.session.as_ref() else {
        return Ok(false);
    };
    if connected.iter().all(|user| session.has_answered(user)) {
        close_round(state, locked, CloseReason::AllAnswered).await?;
        return Ok(true);
    }

    Ok(false)
}
