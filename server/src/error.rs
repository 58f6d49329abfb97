use crate::game::GamePhase;
use shared::GameId;
use thiserror::Error;

/// A well-formed message that does not apply to the sender's current game.
///
/// The `Display` text is what the client sees in the `error` notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Game not found or full")]
    GameUnavailable,
    #[error("Already in game {0}")]
    AlreadyInGame(GameId),
    #[error("Not in a game")]
    NotInGame,
    #[error("Cannot {action} while the game is {phase}")]
    WrongPhase {
        action: &'static str,
        phase: GamePhase,
    },
    #[error("Already marked ready")]
    AlreadyReady,
    #[error("Guess must not be empty")]
    EmptyGuess,
}
