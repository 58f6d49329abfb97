//! Wire protocol shared by the Bulls & Cows session server and its clients.
//!
//! Clients send JSON envelopes of the form `{"Type": "...", "Payload": {...}}`
//! where the payload shape depends on the type. The server answers with flat
//! JSON notifications discriminated by a lowercase `type` field.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const GAME_ID_PREFIX: &str = "GAME";
pub const GAME_ID_SUFFIX_LEN: usize = 4;
pub const GAME_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Cows a graded guess needs for its guesser to win.
pub const WINNING_COWS: u32 = 4;
/// Reported as the winner when both players win the same round.
pub const DRAW: &str = "draw";

pub const CREATE_GAME: &str = "create_game";
pub const JOIN_GAME: &str = "join_game";
pub const PLAYER_READY: &str = "player_ready";
pub const MAKE_GUESS: &str = "make_guess";
pub const SUBMIT_RESULT: &str = "submit_result";

/// Short code identifying a live game, e.g. `GAME7QX2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A player's grading of the opponent's guess.
///
/// Tallies are unsigned: a negative count fails payload decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessResult {
    pub bulls: u32,
    pub cows: u32,
    /// Client-side claim; adjudication only looks at `cows`.
    #[serde(default)]
    pub is_win: bool,
}

impl GuessResult {
    pub fn new(bulls: u32, cows: u32) -> Self {
        Self {
            bulls,
            cows,
            is_win: cows == WINNING_COWS,
        }
    }

    pub fn is_winning(&self) -> bool {
        self.cows == WINNING_COWS
    }
}

/// Messages a client can send, after envelope and payload decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    CreateGame,
    JoinGame { game_id: GameId },
    PlayerReady { username: String },
    MakeGuess { guess: String },
    SubmitResult(GuessResult),
}

impl ClientMessage {
    /// The envelope `Type` this message travels under.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateGame => CREATE_GAME,
            ClientMessage::JoinGame { .. } => JOIN_GAME,
            ClientMessage::PlayerReady { .. } => PLAYER_READY,
            ClientMessage::MakeGuess { .. } => MAKE_GUESS,
            ClientMessage::SubmitResult(_) => SUBMIT_RESULT,
        }
    }
}

/// One side of a resolved round as reported in `round_result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRound {
    pub guess: String,
    pub bulls: u32,
    pub cows: u32,
}

/// Notifications the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameCreated { game_id: GameId },
    JoinSuccess,
    PlayerJoined,
    OpponentReady { username: String },
    GameStart { p1_username: String, p2_username: String },
    OpponentGuess { guess: String },
    RoundResult { p1: PlayerRound, p2: PlayerRound },
    GameOver { winner: String },
    OpponentDisconnected,
    GameExpired { game_id: GameId },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "Type", alias = "type")]
    kind: String,
    #[serde(rename = "Payload", alias = "payload", default)]
    payload: Value,
}

#[derive(Serialize, Deserialize)]
struct JoinPayload {
    game_id: GameId,
}

#[derive(Serialize, Deserialize)]
struct ReadyPayload {
    username: String,
}

#[derive(Serialize, Deserialize)]
struct GuessPayload {
    guess: String,
}

fn decode_payload<T: DeserializeOwned>(kind: &'static str, payload: Value) -> Result<T, CodecError> {
    serde_json::from_value(payload).map_err(|source| CodecError::Payload { kind, source })
}

impl Envelope {
    fn into_message(self) -> Result<ClientMessage, CodecError> {
        let Envelope { kind, payload } = self;
        match kind.as_str() {
            CREATE_GAME => Ok(ClientMessage::CreateGame),
            JOIN_GAME => {
                let JoinPayload { game_id } = decode_payload(JOIN_GAME, payload)?;
                Ok(ClientMessage::JoinGame { game_id })
            }
            PLAYER_READY => {
                let ReadyPayload { username } = decode_payload(PLAYER_READY, payload)?;
                Ok(ClientMessage::PlayerReady { username })
            }
            MAKE_GUESS => {
                let GuessPayload { guess } = decode_payload(MAKE_GUESS, payload)?;
                Ok(ClientMessage::MakeGuess { guess })
            }
            SUBMIT_RESULT => Ok(ClientMessage::SubmitResult(decode_payload(
                SUBMIT_RESULT,
                payload,
            )?)),
            other => Err(CodecError::UnknownType(other.to_string())),
        }
    }
}

/// Decodes one inbound text frame.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, CodecError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(CodecError::Envelope)?;
    envelope.into_message()
}

/// Decodes one inbound binary frame holding the same JSON envelope.
pub fn decode_client_bytes(bytes: &[u8]) -> Result<ClientMessage, CodecError> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(CodecError::Envelope)?;
    envelope.into_message()
}

/// Wraps a client message in its envelope. Used by clients and tests.
pub fn encode_client_message(message: &ClientMessage) -> Result<String, CodecError> {
    let payload = match message {
        ClientMessage::CreateGame => Ok(Value::Object(Default::default())),
        ClientMessage::JoinGame { game_id } => serde_json::to_value(JoinPayload {
            game_id: game_id.clone(),
        }),
        ClientMessage::PlayerReady { username } => serde_json::to_value(ReadyPayload {
            username: username.clone(),
        }),
        ClientMessage::MakeGuess { guess } => serde_json::to_value(GuessPayload {
            guess: guess.clone(),
        }),
        ClientMessage::SubmitResult(result) => serde_json::to_value(result),
    }
    .map_err(CodecError::Encode)?;

    let envelope = Envelope {
        kind: message.kind().to_string(),
        payload,
    };
    serde_json::to_string(&envelope).map_err(CodecError::Encode)
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Envelope)
}
