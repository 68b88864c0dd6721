//! In-memory game session state: rounds, answers, and derived scores.

use std::time::SystemTime;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::{error::ServiceError, quiz::models::Question};

/// One recorded submission. Immutable once stored; at most one per player
/// per question (first-write-wins).
#[derive(Debug, Clone)]
pub struct Answer {
    /// Submitting player's user id.
    pub player_id: String,
    /// Raw submitted value.
    pub submitted_value: String,
    /// Client-reported seconds left on the countdown at submit time.
    pub time_remaining_secs: f64,
    /// Server-assigned receive time.
    pub received_at: SystemTime,
}

/// Derived per-round outcome for a single player. Recomputed from the
/// recorded answers, never stored as authoritative state.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    /// Player the result belongs to.
    pub player_id: String,
    /// Whether the submission counted as correct.
    pub correct: bool,
    /// Points awarded for the round.
    pub points_awarded: u32,
}

/// Aggregated state for the game session of one lobby while it is in game.
#[derive(Debug, Clone)]
pub struct GameSession {
    /// Code of the owning lobby.
    pub lobby_code: String,
    /// Zero-based index of the current question.
    pub question_index: usize,
    /// Total questions played this session.
    pub total_questions: usize,
    /// The live question, present from round start until the session ends.
    pub current_question: Option<Question>,
    /// Absolute deadline of the live round, cleared once the round closes.
    pub round_deadline: Option<Instant>,
    /// Answers for the current round, insertion order = submission order.
    pub answers: IndexMap<String, Answer>,
}

impl GameSession {
    /// Create a session positioned before its first question.
    pub fn new(lobby_code: impl Into<String>, total_questions: usize) -> Self {
        Self {
            lobby_code: lobby_code.into(),
            question_index: 0,
            total_questions,
            current_question: None,
            round_deadline: None,
            answers: IndexMap::new(),
        }
    }

    /// Install the next question and open the round until `deadline`.
    pub fn begin_round(&mut self, question: Question, deadline: Instant) {
        self.current_question = Some(question);
        self.round_deadline = Some(deadline);
        self.answers.clear();
    }

    /// Close the live round; late submissions are rejected from here on.
    pub fn close_round(&mut self) {
        self.round_deadline = None;
    }

    /// Whether the round is currently accepting answers.
    pub fn round_open(&self) -> bool {
        self.round_deadline
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Record an answer, rejecting a second submission by the same player.
    pub fn record_answer(&mut self, answer: Answer) -> Result<(), ServiceError> {
        if self.answers.contains_key(&answer.player_id) {
            return Err(ServiceError::Duplicate(format!(
                "player `{}` already answered question {}",
                answer.player_id, self.question_index
            )));
        }

        self.answers.insert(answer.player_id.clone(), answer);
        Ok(())
    }

    /// Whether `user_id` already has a recorded answer this round.
    pub fn has_answered(&self, user_id: &str) -> bool {
        self.answers.contains_key(user_id)
    }

    /// Whether the current question is the last of the session.
    pub fn is_last_question(&self) -> bool {
        self.question_index + 1 >= self.total_questions
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::quiz::models::{Difficulty, Question, QuestionOrigin};

    use super::*;

    fn question() -> Question {
        Question {
            text: "What does CI stand for?".into(),
            options: vec!["Continuous Integration".into(), "Code Inspection".into()],
            correct_answer: "Continuous Integration".into(),
            difficulty: Difficulty::Basic,
            origin: QuestionOrigin::Fallback,
        }
    }

    fn answer(player: &str, value: &str) -> Answer {
        Answer {
            player_id: player.into(),
            submitted_value: value.into(),
            time_remaining_secs: 20.0,
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn second_answer_for_same_round_is_rejected() {
        let mut session = GameSession::new("ABCD", 5);
        session.begin_round(question(), Instant::now() + Duration::from_secs(30));

        session.record_answer(answer("alice", "Continuous Integration")).unwrap();
        let err = session.record_answer(answer("alice", "Code Inspection")).unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate(_)));

        // The first recorded value stands.
        assert_eq!(
            session.answers.get("alice").unwrap().submitted_value,
            "Continuous Integration"
        );
        assert_eq!(session.answers.len(), 1);
    }

    #[tokio::test]
    async fn answers_preserve_submission_order() {
        let mut session = GameSession::new("ABCD", 5);
        session.begin_round(question(), Instant::now() + Duration::from_secs(30));

        session.record_answer(answer("bob", "a")).unwrap();
        session.record_answer(answer("alice", "b")).unwrap();
        session.record_answer(answer("carol", "c")).unwrap();

        let order: Vec<&str> = session.answers.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["bob", "alice", "carol"]);
    }

    #[tokio::test]
    async fn beginning_a_round_clears_previous_answers() {
        let mut session = GameSession::new("ABCD", 5);
        session.begin_round(question(), Instant::now() + Duration::from_secs(30));
        session.record_answer(answer("alice", "a")).unwrap();

        session.question_index += 1;
        session.begin_round(question(), Instant::now() + Duration::from_secs(30));
        assert!(session.answers.is_empty());
        assert!(!session.has_answered("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn round_open_tracks_the_deadline() {
        let mut session = GameSession::new("ABCD", 5);
        session.begin_round(question(), Instant::now() + Duration::from_secs(30));
        assert!(session.round_open());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!session.round_open());

        session.close_round();
        assert!(session.round_deadline.is_none());
    }

    #[test]
    fn last_question_detection() {
        let mut session = GameSession::new("ABCD", 2);
        assert!(!session.is_last_question());
        session.question_index = 1;
        assert!(session.is_last_question());
    }
}
