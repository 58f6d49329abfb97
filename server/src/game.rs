//! Per-game state and the round transition rules.
//!
//! A `Game` never talks to the network. The hub calls these methods while it
//! holds its lock and turns the returned outcomes into notifications.

use crate::client_manager::ConnectionId;
use crate::error::ProtocolError;
use shared::{GameId, GuessResult, PlayerRound};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    WaitingForJoin,
    WaitingForReady,
    WaitingForGuesses,
    WaitingForResults,
    GameOver,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::WaitingForJoin => "waiting_for_join",
            GamePhase::WaitingForReady => "waiting_for_ready",
            GamePhase::WaitingForGuesses => "waiting_for_guesses",
            GamePhase::WaitingForResults => "waiting_for_results",
            GamePhase::GameOver => "game_over",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Player1,
    Player2,
}

impl Seat {
    pub fn opponent(self) -> Seat {
        match self {
            Seat::Player1 => Seat::Player2,
            Seat::Player2 => Seat::Player1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Winner(Seat),
    Draw,
}

/// Both sides of a round once every result is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub p1: PlayerRound,
    pub p2: PlayerRound,
    pub verdict: Verdict,
}

#[derive(Debug)]
pub struct Game {
    pub id: GameId,
    pub player1: ConnectionId,
    pub player2: Option<ConnectionId>,
    phase: GamePhase,
    p1_guess: Option<String>,
    p2_guess: Option<String>,
    /// Grading of player1's guess, submitted by player2.
    p1_result: Option<GuessResult>,
    /// Grading of player2's guess, submitted by player1.
    p2_result: Option<GuessResult>,
    last_activity: Instant,
}

impl Game {
    pub fn new(id: GameId, creator: ConnectionId, now: Instant) -> Self {
        Self {
            id,
            player1: creator,
            player2: None,
            phase: GamePhase::WaitingForJoin,
            p1_guess: None,
            p2_guess: None,
            p1_result: None,
            p2_result: None,
            last_activity: now,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn seat_of(&self, connection: ConnectionId) -> Option<Seat> {
        if connection == self.player1 {
            Some(Seat::Player1)
        } else if Some(connection) == self.player2 {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    pub fn player(&self, seat: Seat) -> Option<ConnectionId> {
        match seat {
            Seat::Player1 => Some(self.player1),
            Seat::Player2 => self.player2,
        }
    }

    /// Connected participants, player1 first.
    pub fn players(&self) -> impl Iterator<Item = ConnectionId> {
        std::iter::once(self.player1).chain(self.player2)
    }

    pub fn opponent_of(&self, connection: ConnectionId) -> Option<ConnectionId> {
        self.seat_of(connection)
            .and_then(|seat| self.player(seat.opponent()))
    }

    pub fn guess(&self, seat: Seat) -> Option<&str> {
        match seat {
            Seat::Player1 => self.p1_guess.as_deref(),
            Seat::Player2 => self.p2_guess.as_deref(),
        }
    }

    /// The stored grading of `seat`'s guess.
    pub fn result(&self, seat: Seat) -> Option<GuessResult> {
        match seat {
            Seat::Player1 => self.p1_result,
            Seat::Player2 => self.p2_result,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= timeout
    }

    pub fn expect_phase(&self, expected: GamePhase, action: &'static str) -> Result<(), ProtocolError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ProtocolError::WrongPhase {
                action,
                phase: self.phase,
            })
        }
    }

    /// Seats `joiner` as player2. The creator cannot join its own game.
    pub fn join(&mut self, joiner: ConnectionId) -> Result<(), ProtocolError> {
        if self.phase != GamePhase::WaitingForJoin
            || self.player2.is_some()
            || joiner == self.player1
        {
            return Err(ProtocolError::GameUnavailable);
        }

        self.player2 = Some(joiner);
        self.phase = GamePhase::WaitingForReady;
        Ok(())
    }

    /// Opens the first round once both players are ready.
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        self.expect_phase(GamePhase::WaitingForReady, "start")?;
        self.reset_round();
        self.phase = GamePhase::WaitingForGuesses;
        Ok(())
    }

    /// Stores a guess. Returns `(p1_guess, p2_guess)` once both are in.
    pub fn submit_guess(
        &mut self,
        seat: Seat,
        guess: String,
    ) -> Result<Option<(String, String)>, ProtocolError> {
        self.expect_phase(GamePhase::WaitingForGuesses, "make a guess")?;
        if guess.is_empty() {
            return Err(ProtocolError::EmptyGuess);
        }

        match seat {
            Seat::Player1 => self.p1_guess = Some(guess),
            Seat::Player2 => self.p2_guess = Some(guess),
        }

        match (&self.p1_guess, &self.p2_guess) {
            (Some(p1), Some(p2)) => {
                let guesses = (p1.clone(), p2.clone());
                self.phase = GamePhase::WaitingForResults;
                Ok(Some(guesses))
            }
            _ => Ok(None),
        }
    }

    /// Stores a grading submitted by `seat`.
    ///
    /// A player grades the opponent's guess, so the result lands on the
    /// opponent's side. Once both gradings are in, the round resolves: either
    /// the game ends or the round state is cleared for the next one.
    pub fn submit_result(
        &mut self,
        seat: Seat,
        result: GuessResult,
    ) -> Result<Option<RoundOutcome>, ProtocolError> {
        self.expect_phase(GamePhase::WaitingForResults, "submit a result")?;

        match seat.opponent() {
            Seat::Player1 => self.p1_result = Some(result),
            Seat::Player2 => self.p2_result = Some(result),
        }

        let (Some(p1_result), Some(p2_result)) = (self.p1_result, self.p2_result) else {
            return Ok(None);
        };

        let p1 = PlayerRound {
            guess: self.p1_guess.clone().unwrap_or_default(),
            bulls: p1_result.bulls,
            cows: p1_result.cows,
        };
        let p2 = PlayerRound {
            guess: self.p2_guess.clone().unwrap_or_default(),
            bulls: p2_result.bulls,
            cows: p2_result.cows,
        };

        let verdict = match (p1_result.is_winning(), p2_result.is_winning()) {
            (true, true) => Verdict::Draw,
            (true, false) => Verdict::Winner(Seat::Player1),
            (false, true) => Verdict::Winner(Seat::Player2),
            (false, false) => Verdict::Continue,
        };

        if verdict == Verdict::Continue {
            self.reset_round();
            self.phase = GamePhase::WaitingForGuesses;
        } else {
            self.phase = GamePhase::GameOver;
        }

        Ok(Some(RoundOutcome { p1, p2, verdict }))
    }

    fn reset_round(&mut self) {
        self.p1_guess = None;
        self.p2_guess = None;
        self.p1_result = None;
        self.p2_result = None;
    }
}
