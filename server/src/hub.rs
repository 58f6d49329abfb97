//! The session hub: every inbound message and every disconnect for every game
//! goes through here.
//!
//! One lock guards both the game registry and the connection records, and it
//! is held for the whole handling of a message, including queueing the
//! notifications that message triggers. That gives a single total order over
//! all state changes in the process.

use crate::client_manager::{ClientManager, ConnectionId};
use crate::error::ProtocolError;
use crate::game::{Game, GamePhase, Verdict};
use crate::utils::generate_game_id;
use log::{debug, info, warn};
use shared::{ClientMessage, GameId, GuessResult, ServerMessage, DRAW};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

pub struct Hub {
    state: Mutex<HubState>,
    idle_timeout: Option<Duration>,
}

struct HubState {
    clients: ClientManager,
    games: HashMap<GameId, Game>,
}

impl Hub {
    /// `idle_timeout` of `None` keeps untouched games around forever.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(HubState {
                clients: ClientManager::new(),
                games: HashMap::new(),
            }),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Records a new connection whose notifications go to `outbound`.
    pub async fn register(&self, outbound: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let mut state = self.state.lock().await;
        state.clients.add_client(outbound)
    }

    /// Applies one decoded client message.
    ///
    /// A message that does not fit the sender's current game leaves all state
    /// untouched and earns the sender one `error` notification.
    pub async fn process_message(&self, connection: ConnectionId, message: ClientMessage) {
        debug!("Message {} from connection {}", message.kind(), connection);

        let mut state = self.state.lock().await;
        if state.clients.get(connection).is_none() {
            warn!(
                "Dropping {} from unregistered connection {}",
                message.kind(),
                connection
            );
            return;
        }

        let kind = message.kind();
        if let Err(err) = state.dispatch(connection, message, Instant::now()) {
            warn!("Rejected {} from connection {}: {}", kind, connection, err);
            state.clients.send(
                connection,
                ServerMessage::Error {
                    message: err.to_string(),
                },
            );
        }
    }

    /// Forgets a connection. Its game, if any, is torn down and the opponent
    /// told once. Dropping the record closes the connection's outbound queue.
    pub async fn unregister(&self, connection: ConnectionId) {
        let mut state = self.state.lock().await;
        let Some(client) = state.clients.remove_client(connection) else {
            return;
        };

        if let Some(game_id) = client.game.as_ref() {
            if let Some(game) = state.games.remove(game_id) {
                info!(
                    "Game {} closed: connection {} disconnected",
                    game_id, connection
                );
                if let Some(opponent) = game.opponent_of(connection) {
                    state.clients.detach(opponent);
                    state
                        .clients
                        .send(opponent, ServerMessage::OpponentDisconnected);
                }
            }
        }
    }

    /// Removes every game with no activity for the idle timeout and tells its
    /// players. Returns the expired ids.
    pub async fn expire_idle_games(&self, now: Instant) -> Vec<GameId> {
        let Some(timeout) = self.idle_timeout else {
            return Vec::new();
        };

        let mut state = self.state.lock().await;
        let expired: Vec<GameId> = state
            .games
            .values()
            .filter(|game| game.is_idle(now, timeout))
            .map(|game| game.id.clone())
            .collect();

        for game_id in &expired {
            if let Some(game) = state.games.remove(game_id) {
                info!("Game {} expired in phase {}", game_id, game.phase());
                for player in game.players() {
                    state.clients.detach(player);
                    state.clients.send(
                        player,
                        ServerMessage::GameExpired {
                            game_id: game_id.clone(),
                        },
                    );
                }
            }
        }

        expired
    }

    pub async fn game_count(&self) -> usize {
        self.state.lock().await.games.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    pub async fn game_phase(&self, game_id: &GameId) -> Option<GamePhase> {
        self.state.lock().await.games.get(game_id).map(Game::phase)
    }

    pub async fn game_of(&self, connection: ConnectionId) -> Option<GameId> {
        self.state.lock().await.clients.game_of(connection).cloned()
    }
}

impl HubState {
    fn dispatch(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        match message {
            ClientMessage::CreateGame => self.create_game(connection, now),
            ClientMessage::JoinGame { game_id } => self.join_game(connection, &game_id, now),
            ClientMessage::PlayerReady { username } => {
                self.player_ready(connection, username, now)
            }
            ClientMessage::MakeGuess { guess } => self.make_guess(connection, guess, now),
            ClientMessage::SubmitResult(result) => self.submit_result(connection, result, now),
        }
    }

    fn ensure_unattached(&self, connection: ConnectionId) -> Result<(), ProtocolError> {
        match self.clients.game_of(connection) {
            Some(game_id) => Err(ProtocolError::AlreadyInGame(game_id.clone())),
            None => Ok(()),
        }
    }

    fn current_game(&self, connection: ConnectionId) -> Result<GameId, ProtocolError> {
        self.clients
            .game_of(connection)
            .cloned()
            .ok_or(ProtocolError::NotInGame)
    }

    fn unique_game_id(&self) -> GameId {
        let mut rng = rand::thread_rng();
        loop {
            let game_id = generate_game_id(&mut rng);
            if !self.games.contains_key(&game_id) {
                return game_id;
            }
            debug!("Game id {} already live, drawing again", game_id);
        }
    }

    fn create_game(&mut self, connection: ConnectionId, now: Instant) -> Result<(), ProtocolError> {
        self.ensure_unattached(connection)?;

        let game_id = self.unique_game_id();
        self.games
            .insert(game_id.clone(), Game::new(game_id.clone(), connection, now));
        self.clients.attach(connection, game_id.clone());

        info!("Connection {} created game {}", connection, game_id);
        self.clients
            .send(connection, ServerMessage::GameCreated { game_id });
        Ok(())
    }

    fn join_game(
        &mut self,
        connection: ConnectionId,
        game_id: &GameId,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        self.ensure_unattached(connection)?;

        let game = self
            .games
            .get_mut(game_id)
            .ok_or(ProtocolError::GameUnavailable)?;
        game.join(connection)?;
        game.touch(now);
        let creator = game.player1;

        self.clients.attach(connection, game_id.clone());
        info!("Connection {} joined game {}", connection, game_id);

        self.clients.send(connection, ServerMessage::JoinSuccess);
        self.clients.send(creator, ServerMessage::PlayerJoined);
        Ok(())
    }

    fn player_ready(
        &mut self,
        connection: ConnectionId,
        username: String,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        let game_id = self.current_game(connection)?;
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(ProtocolError::NotInGame)?;
        game.expect_phase(GamePhase::WaitingForReady, "mark ready")?;

        let client = self
            .clients
            .get_mut(connection)
            .ok_or(ProtocolError::NotInGame)?;
        if client.ready {
            return Err(ProtocolError::AlreadyReady);
        }
        client.username = username.clone();
        client.ready = true;
        game.touch(now);

        if let Some(opponent) = game.opponent_of(connection) {
            self.clients
                .send(opponent, ServerMessage::OpponentReady { username });
        }

        let all_ready = game.player2.is_some() && game.players().all(|id| self.clients.is_ready(id));
        if all_ready {
            game.start()?;
            info!("Game {} started", game_id);

            let start = ServerMessage::GameStart {
                p1_username: self.clients.username(game.player1),
                p2_username: game
                    .player2
                    .map(|id| self.clients.username(id))
                    .unwrap_or_default(),
            };
            self.clients.broadcast(game.players(), &start);
        }
        Ok(())
    }

    fn make_guess(
        &mut self,
        connection: ConnectionId,
        guess: String,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        let game_id = self.current_game(connection)?;
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(ProtocolError::NotInGame)?;
        let seat = game.seat_of(connection).ok_or(ProtocolError::NotInGame)?;

        let both = game.submit_guess(seat, guess)?;
        game.touch(now);

        if let Some((p1_guess, p2_guess)) = both {
            // Each side grades the other's guess.
            self.clients
                .send(game.player1, ServerMessage::OpponentGuess { guess: p2_guess });
            if let Some(player2) = game.player2 {
                self.clients
                    .send(player2, ServerMessage::OpponentGuess { guess: p1_guess });
            }
        }
        Ok(())
    }

    fn submit_result(
        &mut self,
        connection: ConnectionId,
        result: GuessResult,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        let game_id = self.current_game(connection)?;
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(ProtocolError::NotInGame)?;
        let seat = game.seat_of(connection).ok_or(ProtocolError::NotInGame)?;

        let Some(outcome) = game.submit_result(seat, result)? else {
            game.touch(now);
            return Ok(());
        };
        game.touch(now);

        let players: Vec<ConnectionId> = game.players().collect();
        self.clients.broadcast(
            players.iter().copied(),
            &ServerMessage::RoundResult {
                p1: outcome.p1,
                p2: outcome.p2,
            },
        );

        let winner = match outcome.verdict {
            Verdict::Continue => return Ok(()),
            Verdict::Draw => DRAW.to_string(),
            Verdict::Winner(seat) => game
                .player(seat)
                .map(|id| self.clients.username(id))
                .unwrap_or_default(),
        };

        info!("Game {} over, winner: {}", game_id, winner);
        self.clients
            .broadcast(players.iter().copied(), &ServerMessage::GameOver { winner });
        self.retire_game(&game_id);
        Ok(())
    }

    /// Drops a finished game and frees its players for another one.
    fn retire_game(&mut self, game_id: &GameId) {
        if let Some(game) = self.games.remove(game_id) {
            for player in game.players() {
                self.clients.detach(player);
            }
        }
    }
}
