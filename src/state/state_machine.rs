use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// High-level phases the game can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Waiting for players to register.
    Lobby,
    /// Player quota reached; preference messages are gathered until the countdown ends.
    CollectingPreferences,
    /// The board is being generated or loaded.
    GeneratingBoard,
    /// The player with control picks the next clue.
    AwaitingSelection,
    /// A clue is on screen and the buzzer may be open.
    QuestionActive,
    /// A player buzzed in and owes an answer.
    AwaitingAnswer,
    /// Final round wagers and answers.
    Final,
    /// Game finished; scores are frozen.
    GameOver,
}

impl GamePhase {
    /// Whether players may still register.
    pub fn accepts_registration(self) -> bool {
        matches!(self, Self::Lobby | Self::CollectingPreferences)
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// The configured number of players registered.
    QuotaReached,
    /// The preference countdown elapsed.
    CountdownElapsed,
    /// A board was generated or loaded and control assigned.
    BoardReady,
    /// Neither generation nor the fallback board produced a board.
    BoardFailed,
    /// The controller picked a valid clue.
    ClueSelected,
    /// A buzz was accepted (or a daily double answer started).
    BuzzAccepted,
    /// The buzzing player answered wrong or ran out of time.
    AnswerIncorrect,
    /// The current question was dismissed.
    QuestionCleared,
    /// The last clue of the board was played.
    BoardExhausted,
    /// The game is over.
    GameFinished,
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

/// Phase machine driving the quiz flow.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    phase: GamePhase,
    version: u64,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self {
            phase: GamePhase::Lobby,
            version: 0,
        }
    }
}

impl GameStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Whether `event` would be accepted from the current phase.
    pub fn can_apply(&self, event: GameEvent) -> bool {
        self.compute_transition(event).is_ok()
    }

    fn compute_transition(&self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        use GameEvent as E;
        use GamePhase as P;

        let next = match (self.phase, event) {
            (P::Lobby, E::QuotaReached) => P::CollectingPreferences,
            (P::CollectingPreferences, E::CountdownElapsed) => P::GeneratingBoard,
            (P::GeneratingBoard, E::BoardReady) => P::AwaitingSelection,
            (P::GeneratingBoard, E::BoardFailed) => P::CollectingPreferences,
            (P::AwaitingSelection, E::ClueSelected) => P::QuestionActive,
            (P::QuestionActive, E::BuzzAccepted) => P::AwaitingAnswer,
            (P::AwaitingAnswer, E::AnswerIncorrect) => P::QuestionActive,
            (P::QuestionActive | P::AwaitingAnswer, E::QuestionCleared) => P::AwaitingSelection,
            (P::QuestionActive | P::AwaitingAnswer | P::AwaitingSelection, E::BoardExhausted) => {
                P::Final
            }
            (
                P::QuestionActive | P::AwaitingAnswer | P::AwaitingSelection | P::Final,
                E::GameFinished,
            ) => P::GameOver,
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
    fn initial_state_is_lobby() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.phase(), GamePhase::Lobby);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut sm = GameStateMachine::new();

        assert_eq!(
            apply(&mut sm, GameEvent::QuotaReached),
            GamePhase::CollectingPreferences
        );
        assert_eq!(
            apply(&mut sm, GameEvent::CountdownElapsed),
            GamePhase::GeneratingBoard
        );
        assert_eq!(
            apply(&mut sm, GameEvent::BoardReady),
            GamePhase::AwaitingSelection
        );
        assert_eq!(
            apply(&mut sm, GameEvent::ClueSelected),
            GamePhase::QuestionActive
        );
        assert_eq!(
            apply(&mut sm, GameEvent::BuzzAccepted),
            GamePhase::AwaitingAnswer
        );
        assert_eq!(
            apply(&mut sm, GameEvent::AnswerIncorrect),
            GamePhase::QuestionActive
        );
        assert_eq!(
            apply(&mut sm, GameEvent::QuestionCleared),
            GamePhase::AwaitingSelection
        );
        assert_eq!(apply(&mut sm, GameEvent::BoardExhausted), GamePhase::Final);
        assert_eq!(apply(&mut sm, GameEvent::GameFinished), GamePhase::GameOver);
        assert_eq!(sm.version(), 9);
    }

    #[test]
    fn board_failure_returns_to_preferences() {
        let mut sm = GameStateMachine::new();
        apply(&mut sm, GameEvent::QuotaReached);
        apply(&mut sm, GameEvent::CountdownElapsed);
        assert_eq!(
            apply(&mut sm, GameEvent::BoardFailed),
            GamePhase::CollectingPreferences
        );
    }

    #[test]
    fn invalid_transition_returns_error_and_keeps_version() {
        let mut sm = GameStateMachine::new();
        let err = sm.apply(GameEvent::BuzzAccepted).unwrap_err();
        assert_eq!(err.from, GamePhase::Lobby);
        assert_eq!(err.event, GameEvent::BuzzAccepted);
        assert_eq!(sm.version(), 0);
        assert!(!sm.can_apply(GameEvent::ClueSelected));
    }

    #[test]
    fn game_over_is_terminal() {
        let mut sm = GameStateMachine::new();
        for event in [
            GameEvent::QuotaReached,
            GameEvent::CountdownElapsed,
            GameEvent::BoardReady,
            GameEvent::GameFinished,
        ] {
            apply(&mut sm, event);
        }
        assert_eq!(sm.phase(), GamePhase::GameOver);
        assert!(sm.apply(GameEvent::QuotaReached).is_err());
        assert!(sm.apply(GameEvent::ClueSelected).is_err());
    }
}
