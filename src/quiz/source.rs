//! Port over the external question/grading collaborator.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::quiz::models::{Difficulty, Question};

/// Result alias for question source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Error raised by question source backends.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend could not be reached or rejected the request.
    #[error("question source unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with something we could not interpret.
    #[error("malformed source response: {0}")]
    Malformed(String),
}

/// Abstraction over the AI question/grading service.
///
/// Failures are always recoverable: the game core falls back to the stored
/// question pool and to normalized-match grading, so an outage degrades
/// question variety rather than aborting games.
pub trait QuestionSource: Send + Sync {
    /// Produce the next question for a topic at a difficulty.
    fn next_question(
        &self,
        category: String,
        difficulty: Difficulty,
    ) -> BoxFuture<'static, SourceResult<Question>>;

    /// Grade a free-text answer against a question, returning 0-10.
    fn grade_answer(
        &self,
        question: Question,
        answer: String,
    ) -> BoxFuture<'static, SourceResult<u8>>;
}
