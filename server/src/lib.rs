//! # Bulls & Cows Session Server
//!
//! This library provides the server side of a two-player Bulls & Cows game
//! played over WebSockets. The server never knows either secret: it pairs two
//! connections into a game, relays each guess to the opponent for grading,
//! collects both gradings and decides when someone has won.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! One client creates a game and receives a short code; a second client joins
//! with that code. Both then ready up with a display name.
//!
//! ### Refereeing
//! Rounds are simultaneous. Each player submits a guess, receives the
//! opponent's guess, grades it locally and reports the bulls/cows back. Once
//! both gradings are in, the round result is broadcast and a guess graded at
//! four cows wins the game (both at once is a draw).
//!
//! ### Cleanup
//! A disconnect tears down the player's game and tells the opponent. Finished
//! games are dropped straight away and abandoned ones expire after an idle
//! timeout.
//!
//! ## Architecture Design
//!
//! ### Single Coordination Point
//! All game state lives in one [`hub::Hub`] behind a single lock. Every inbound
//! message is handled start to finish while holding it, so no two messages
//! ever interleave, whichever connections they come from.
//!
//! ### Two Tasks Per Connection
//! Each connection runs a reader that decodes frames and feeds the hub, and a
//! writer that drains the connection's own outbound queue. The hub only ever
//! enqueues, so a slow client cannot stall message handling.
//!
//! ## Module Organization
//!
//! - `client_manager`: per-connection records (queue, name, readiness, game)
//! - `game`: per-game state and round transition rules
//! - `hub`: the registry and the message handlers
//! - `connection`: the reader and writer loops
//! - `http`: request-head routing and the plain `GET /` liveness reply
//! - `network`: TCP listener, WebSocket upgrade and the idle reaper
//! - `config`: command line / environment configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::hub::Hub;
//! use server::network::NetworkServer;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(Hub::new(Some(Duration::from_secs(900))));
//!     let server = NetworkServer::bind("0.0.0.0:8001", "/ws", hub).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod http;
pub mod hub;
pub mod network;
pub mod utils;
