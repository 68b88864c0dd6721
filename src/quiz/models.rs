//! Question models shared by the source backends and the game core.

/// Requested difficulty of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// Entry-level question.
    Basic,
    /// Mid-level question.
    Intermediate,
    /// Expert-level question.
    Advanced,
}

impl Difficulty {
    /// Map the wire representation (1-3) onto a difficulty, clamping
    /// out-of-range values to the nearest level.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Difficulty::Basic,
            2 => Difficulty::Intermediate,
            _ => Difficulty::Advanced,
        }
    }

    /// Wire representation, 1-3.
    pub fn level(self) -> u8 {
        match self {
            Difficulty::Basic => 1,
            Difficulty::Intermediate => 2,
            Difficulty::Advanced => 3,
        }
    }

    /// Human-readable label used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Basic => "basic level",
            Difficulty::Intermediate => "intermediate level",
            Difficulty::Advanced => "advanced level",
        }
    }
}

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOrigin {
    /// Produced by the AI collaborator.
    Generated,
    /// Drawn from the stored fallback pool.
    Fallback,
}

/// One quiz question. Immutable once issued to a round; the correct answer
/// never leaves the server until the reveal.
#[derive(Debug, Clone)]
pub struct Question {
    /// Question text shown to players.
    pub text: String,
    /// Choices for multiple-choice questions; empty for free text.
    pub options: Vec<String>,
    /// Reference answer used for scoring and revealed after the round.
    pub correct_answer: String,
    /// Difficulty the question was requested at.
    pub difficulty: Difficulty,
    /// Source that produced the question.
    pub origin: QuestionOrigin,
}

impl Question {
    /// Whether the question restricts submissions to a fixed option set.
    pub fn is_multiple_choice(&self) -> bool {
        !self.options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_levels_round_trip() {
        for level in 1..=3u8 {
            assert_eq!(Difficulty::from_level(level).level(), level);
        }
        assert_eq!(Difficulty::from_level(0), Difficulty::Basic);
        assert_eq!(Difficulty::from_level(9), Difficulty::Advanced);
    }
}
