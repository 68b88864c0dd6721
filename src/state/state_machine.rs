//! Per-lobby game phase machine with version-stamped transitions.

use thiserror::Error;

/// High-level phases a lobby's game can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// No game session is active; the lobby is open for joins.
    Idle,
    /// Start was accepted; the first question is being prepared.
    Starting,
    /// A question is live and answers are being collected.
    QuestionActive,
    /// The round closed; results are shown before advancing.
    Revealing,
    /// The final question was revealed; standings are published.
    Ended,
}

/// Why a live round was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The question countdown elapsed.
    TimerExpired,
    /// Every currently-connected player submitted an answer.
    AllAnswered,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// The host requested a game start.
    StartRequested,
    /// A question was obtained and the round goes live.
    QuestionReady,
    /// The live round closed (timer or all-answered).
    RoundClosed(CloseReason),
    /// The reveal grace elapsed and another question follows.
    NextQuestion,
    /// The reveal grace elapsed after the last question.
    Finish,
    /// The game was torn down or reset back to idle.
    Abort,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: GameEvent,
}

/// Monotonic stamp captured when arming timers; a mismatch on fire means the
/// round has already advanced and the firing must be ignored.
pub type RoundStamp = u64;

/// State machine implementing the question/answer/reveal cycle.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    phase: GamePhase,
    version: RoundStamp,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self {
            phase: GamePhase::Idle,
            version: 0,
        }
    }
}

impl GameStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Current version stamp; increments on every applied transition.
    pub fn version(&self) -> RoundStamp {
        self.version
    }

    /// Whether a stamp captured earlier still refers to the current state.
    pub fn is_current(&self, stamp: RoundStamp) -> bool {
        self.version == stamp
    }

    /// Apply an event, moving the machine to the next phase and bumping the
    /// version stamp. Invalid events leave the machine untouched.
    pub fn apply(&mut self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(self.phase)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (GamePhase::Idle, GameEvent::StartRequested) => GamePhase::Starting,
            (GamePhase::Starting, GameEvent::QuestionReady) => GamePhase::QuestionActive,
            (GamePhase::QuestionActive, GameEvent::RoundClosed(_)) => GamePhase::Revealing,
            (GamePhase::Revealing, GameEvent::NextQuestion) => GamePhase::QuestionActive,
            (GamePhase::Revealing, GameEvent::Finish) => GamePhase::Ended,
            (from, GameEvent::Abort) if from != GamePhase::Idle => GamePhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut GameStateMachine, event: GameEvent) -> GamePhase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.phase(), GamePhase::Idle);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut sm = GameStateMachine::new();

        assert_eq!(apply(&mut sm, GameEvent::StartRequested), GamePhase::Starting);
        assert_eq!(apply(&mut sm, GameEvent::QuestionReady), GamePhase::QuestionActive);
        assert_eq!(
            apply(&mut sm, GameEvent::RoundClosed(CloseReason::AllAnswered)),
            GamePhase::Revealing
        );
        assert_eq!(apply(&mut sm, GameEvent::NextQuestion), GamePhase::QuestionActive);
        assert_eq!(
            apply(&mut sm, GameEvent::RoundClosed(CloseReason::TimerExpired)),
            GamePhase::Revealing
        );
        assert_eq!(apply(&mut sm, GameEvent::Finish), GamePhase::Ended);
        assert_eq!(apply(&mut sm, GameEvent::Abort), GamePhase::Idle);
        assert_eq!(sm.version(), 7);
    }

    #[test]
    fn stale_stamp_is_detected_after_round_advance() {
        let mut sm = GameStateMachine::new();
        apply(&mut sm, GameEvent::StartRequested);
        apply(&mut sm, GameEvent::QuestionReady);

        // A timer armed for this round captures the stamp now.
        let stamp = sm.version();
        assert!(sm.is_current(stamp));

        // The round closes early (everyone answered) before the timer fires.
        apply(&mut sm, GameEvent::RoundClosed(CloseReason::AllAnswered));
        assert!(!sm.is_current(stamp));
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = GameStateMachine::new();
        let err = sm.apply(GameEvent::NextQuestion).unwrap_err();
        assert_eq!(err.from, GamePhase::Idle);
        assert_eq!(err.event, GameEvent::NextQuestion);
        assert_eq!(sm.phase(), GamePhase::Idle);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn abort_is_rejected_while_idle() {
        let mut sm = GameStateMachine::new();
        assert!(sm.apply(GameEvent::Abort).is_err());
    }

    #[test]
    fn abort_resets_from_any_active_phase() {
        for events in [
            vec![GameEvent::StartRequested],
            vec![GameEvent::StartRequested, GameEvent::QuestionReady],
            vec![
                GameEvent::StartRequested,
                GameEvent::QuestionReady,
                GameEvent::RoundClosed(CloseReason::TimerExpired),
            ],
        ] {
            let mut sm = GameStateMachine::new();
            for event in events {
                apply(&mut sm, event);
            }
            assert_eq!(apply(&mut sm, GameEvent::Abort), GamePhase::Idle);
        }
    }
}
