//! Answer collection and the score engine.

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    dto::event::ServerEvent,
    error::ServiceError,
    quiz::models::Question,
    services::{event_service, game_service},
    state::{
        LobbyState, SharedState,
        game::{Answer, ScoreResult},
        state_machine::GamePhase,
    },
};

/// Points awarded for an instant correct answer.
pub const BASE_POINTS: u32 = 100;
/// Floor applied to every correct answer so speed never zeroes it out.
pub const MIN_CORRECT_POINTS: u32 = 10;
/// Minimum free-text grade (out of 10) that counts as correct.
pub const PASS_MARK: u8 = 5;

/// Record an answer for the live round of a lobby.
///
/// Returns the question index the answer was recorded for. The round closes
/// immediately when every connected player has now answered.
pub async fn submit_answer(
    state: &SharedState,
    code: &str,
    user_id: &str,
    value: &str,
    time_remaining: f64,
) -> Result<usize, ServiceError> {
    let cell = state
        .lobby_cell(code)
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{code}` not found")))?;
    let mut locked = cell.lock().await;

    if locked.machine.phase() != GamePhase::QuestionActive {
        return Err(ServiceError::InvalidState(
            "no round is currently accepting answers".into(),
        ));
    }

    if !locked.lobby.is_member(user_id) {
        return Err(ServiceError::NotFound(format!(
            "user `{user_id}` is not a member of lobby `{code}`"
        )));
    }

    let timer_secs = locked.lobby.settings.question_timer_secs;
    let session = locked
        .session
        .as_mut()
        .ok_or_else(|| ServiceError::InvalidState("no active game session".into()))?;

    if !session.round_open() {
        return Err(ServiceError::InvalidState("round already closed".into()));
    }

    let question_index = session.question_index;
    session.record_answer(Answer {
        player_id: user_id.to_string(),
        submitted_value: value.to_string(),
        // The client-reported remaining time is a claim; clamp it to the
        // round window so it cannot inflate the score.
        time_remaining_secs: time_remaining.clamp(0.0, timer_secs as f64),
        received_at: std::time::SystemTime::now(),
    })?;

    debug!(code, user = user_id, question_index, "answer recorded");
    event_service::publish_event(
        state,
        code,
        ServerEvent::PlayerAnswered {
            user_id: user_id.to_string(),
        },
    )
    .await;

    game_service::try_close_if_all_answered(state, &mut locked).await?;

    Ok(question_index)
}

/// Compute the round outcome for every player of the lobby.
///
/// Players without a recorded answer score zero without error. Free-text
/// answers are graded by the evaluation collaborator when available and fall
/// back to a normalized exact match on failure or timeout.
pub(crate) async fn score_round(state: &SharedState, locked: &LobbyState) -> Vec<ScoreResult> {
    let Some(session) = locked.session.as_ref() else {
        return Vec::new();
    };
    let Some(question) = session.current_question.as_ref() else {
        return Vec::new();
    };
    let timer_secs = locked.lobby.settings.question_timer_secs;

    let mut results = Vec::with_capacity(locked.lobby.players.len());
    for player in locked.lobby.players.values() {
        let result = match session.answers.get(&player.user_id) {
            None => ScoreResult {
                player_id: player.user_id.clone(),
                correct: false,
                points_awarded: 0,
            },
            Some(answer) => score_answer(state, question, answer, timer_secs).await,
        };
        results.push(result);
    }

    results
}

async fn score_answer(
    state: &SharedState,
    question: &Question,
    answer: &Answer,
    timer_secs: u64,
) -> ScoreResult {
    let (correct, points) = if question.is_multiple_choice() {
        let correct = answers_match(&answer.submitted_value, &question.correct_answer);
        (
            correct,
            correct
                .then(|| points_for_correct(answer.time_remaining_secs, timer_secs))
                .unwrap_or(0),
        )
    } else {
        match grade_free_text(state, question, &answer.submitted_value).await {
            Some(grade) => (
                grade >= PASS_MARK,
                graded_points(grade, answer.time_remaining_secs, timer_secs),
            ),
            None => {
                let correct = answers_match(&answer.submitted_value, &question.correct_answer);
                (
                    correct,
                    correct
                        .then(|| points_for_correct(answer.time_remaining_secs, timer_secs))
                        .unwrap_or(0),
                )
            }
        }
    };

    ScoreResult {
        player_id: answer.player_id.clone(),
        correct,
        points_awarded: points,
    }
}

/// Grade a free-text answer via the evaluation collaborator, returning
/// `None` when no grader is available or it fails within the bound.
async fn grade_free_text(state: &SharedState, question: &Question, value: &str) -> Option<u8> {
    let source = state.question_source().await?;
    let bound = state.config().ai_timeout();

    match timeout(bound, source.grade_answer(question.clone(), value.to_string())).await {
        Ok(Ok(grade)) => Some(grade.min(10)),
        Ok(Err(err)) => {
            warn!(error = %err, "answer grading failed; using exact match");
            None
        }
        Err(_) => {
            warn!("answer grading timed out; using exact match");
            None
        }
    }
}

/// Normalize a free-form value for comparison: trimmed, lowercased,
/// whitespace collapsed.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether two values match after normalization.
pub fn answers_match(submitted: &str, correct: &str) -> bool {
    normalize(submitted) == normalize(correct)
}

/// Points for a correct exact-match answer: scales with the remaining-time
/// fraction, floored so a correct answer always scores above zero.
pub fn points_for_correct(time_remaining: f64, timer_secs: u64) -> u32 {
    let fraction = (time_remaining / timer_secs.max(1) as f64).clamp(0.0, 1.0);
    ((BASE_POINTS as f64 * fraction).round() as u32).max(MIN_CORRECT_POINTS)
}

/// Points for a graded free-text answer; failing grades score zero.
pub fn graded_points(grade: u8, time_remaining: f64, timer_secs: u64) -> u32 {
    if grade < PASS_MARK {
        return 0;
    }
    let fraction = (time_remaining / timer_secs.max(1) as f64).clamp(0.0, 1.0);
    let raw = BASE_POINTS as f64 * fraction * (grade.min(10) as f64 / 10.0);
    (raw.round() as u32).max(MIN_CORRECT_POINTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert!(answers_match("  Continuous   Integration ", "continuous integration"));
        assert!(!answers_match("Continuous Delivery", "Continuous Integration"));
    }

    #[test]
    fn faster_answers_score_more() {
        let fast = points_for_correct(25.0, 30);
        let slow = points_for_correct(5.0, 30);
        assert!(fast > slow);
        assert_eq!(points_for_correct(30.0, 30), BASE_POINTS);
    }

    #[test]
    fn correct_answers_always_score_above_zero() {
        assert_eq!(points_for_correct(0.0, 30), MIN_CORRECT_POINTS);
        assert!(points_for_correct(0.1, 30) >= MIN_CORRECT_POINTS);
    }

    #[test]
    fn out_of_range_time_is_clamped() {
        assert_eq!(points_for_correct(99.0, 30), BASE_POINTS);
        assert_eq!(points_for_correct(-5.0, 30), MIN_CORRECT_POINTS);
    }

    #[test]
    fn failing_grades_score_zero() {
        assert_eq!(graded_points(PASS_MARK - 1, 30.0, 30), 0);
        assert_eq!(graded_points(0, 30.0, 30), 0);
    }

    #[test]
    fn passing_grades_scale_with_quality_and_speed() {
        let perfect = graded_points(10, 30.0, 30);
        let partial = graded_points(6, 30.0, 30);
        assert_eq!(perfect, BASE_POINTS);
        assert!(partial < perfect);
        assert!(graded_points(PASS_MARK, 0.0, 30) >= MIN_CORRECT_POINTS);
    }
}
