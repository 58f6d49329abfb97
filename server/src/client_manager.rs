//! Connection records held by the hub
//!
//! Each WebSocket connection gets a `Client` entry that carries:
//! - The sender side of its outbound queue (drained by the connection's writer)
//! - The display name and readiness flag set by the ready handshake
//! - The id of the game it currently sits in, if any
//!
//! Games and clients refer to each other only by id. Removing a client drops
//! its queue sender, which is what ends that connection's outbound loop.

use log::{debug, info};
use shared::{GameId, ServerMessage};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;

/// Process-unique handle for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Client {
    pub id: ConnectionId,
    /// Display name; empty until the player readies up
    pub username: String,
    pub ready: bool,
    /// Game this client currently sits in
    pub game: Option<GameId>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl Client {
    pub fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            username: String::new(),
            ready: false,
            game: None,
            outbound,
        }
    }

    /// Queues a notification for this client's writer.
    ///
    /// Returns false once the writer has gone away; nothing else to do then,
    /// the reader side will unregister the connection.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.outbound.send(message) {
            Ok(()) => true,
            Err(_) => {
                debug!("Outbound queue for connection {} is closed", self.id);
                false
            }
        }
    }

    /// Leaves the current game and clears readiness. The name is kept.
    pub fn detach(&mut self) {
        self.game = None;
        self.ready = false;
    }
}

/// All live connections, keyed by id.
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    next_client_id: u64,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
        }
    }

    pub fn add_client(&mut self, outbound: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        self.clients.insert(id, Client::new(id, outbound));
        info!("Client {} registered", id);
        id
    }

    /// Removes and returns the client. Dropping the returned value closes
    /// its outbound queue.
    pub fn remove_client(&mut self, id: ConnectionId) -> Option<Client> {
        let client = self.clients.remove(&id);
        if client.is_some() {
            info!("Client {} unregistered", id);
        }
        client
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn send(&self, id: ConnectionId, message: ServerMessage) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|client| client.send(message))
    }

    pub fn broadcast(&self, ids: impl IntoIterator<Item = ConnectionId>, message: &ServerMessage) {
        for id in ids {
            self.send(id, message.clone());
        }
    }

    pub fn username(&self, id: ConnectionId) -> String {
        self.clients
            .get(&id)
            .map(|client| client.username.clone())
            .unwrap_or_default()
    }

    pub fn is_ready(&self, id: ConnectionId) -> bool {
        self.clients.get(&id).is_some_and(|client| client.ready)
    }

    pub fn game_of(&self, id: ConnectionId) -> Option<&GameId> {
        self.clients.get(&id).and_then(|client| client.game.as_ref())
    }

    pub fn attach(&mut self, id: ConnectionId, game: GameId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.game = Some(game);
        }
    }

    pub fn detach(&mut self, id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.detach();
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
