//! Load tests for the session hub
//!
//! These drive many games at once through a shared hub from concurrent
//! tasks, checking that everything resolves and stays within rough time
//! bounds.

use server::client_manager::ConnectionId;
use server::hub::Hub;
use shared::{ClientMessage, GameId, GuessResult, ServerMessage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Player {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Player {
    async fn connect(hub: &Hub) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await;
        Player { id, rx }
    }

    async fn next(&mut self) -> ServerMessage {
        timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Timed out waiting for a notification")
            .expect("Outbound queue closed")
    }

    /// Skips notifications until one matches.
    async fn wait_for(&mut self, wanted: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let message = self.next().await;
            if wanted(&message) {
                return message;
            }
        }
    }
}

/// Plays one full game between two fresh connections; `rounds` misses
/// before player1 wins.
async fn play_game(hub: Arc<Hub>, index: usize, rounds: usize) -> String {
    let mut p1 = Player::connect(&hub).await;
    let mut p2 = Player::connect(&hub).await;

    hub.process_message(p1.id, ClientMessage::CreateGame).await;
    let game_id = match p1.next().await {
        ServerMessage::GameCreated { game_id } => game_id,
        other => panic!("Expected game_created, got {:?}", other),
    };

    hub.process_message(p2.id, ClientMessage::JoinGame { game_id }).await;
    assert_eq!(p2.next().await, ServerMessage::JoinSuccess);

    let p1_name = format!("p1-{}", index);
    hub.process_message(p1.id, ClientMessage::PlayerReady { username: p1_name.clone() })
        .await;
    hub.process_message(
        p2.id,
        ClientMessage::PlayerReady {
            username: format!("p2-{}", index),
        },
    )
    .await;

    for round in 0..=rounds {
        hub.process_message(
            p1.id,
            ClientMessage::MakeGuess {
                guess: format!("{:04}", round),
            },
        )
        .await;
        hub.process_message(
            p2.id,
            ClientMessage::MakeGuess {
                guess: format!("{:04}", round + 5000),
            },
        )
        .await;

        // p2 grades p1's guess; p1 wins on the final round
        let p1_cows = if round == rounds { 4 } else { 1 };
        hub.process_message(p1.id, ClientMessage::SubmitResult(GuessResult::new(0, 0)))
            .await;
        hub.process_message(p2.id, ClientMessage::SubmitResult(GuessResult::new(0, p1_cows)))
            .await;
    }

    let over = p1
        .wait_for(|m| matches!(m, ServerMessage::GameOver { .. }))
        .await;
    p2.wait_for(|m| matches!(m, ServerMessage::GameOver { .. }))
        .await;

    hub.unregister(p1.id).await;
    hub.unregister(p2.id).await;

    match over {
        ServerMessage::GameOver { winner } => {
            assert_eq!(winner, p1_name);
            winner
        }
        _ => unreachable!(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn benchmark_concurrent_games() {
    let hub = Arc::new(Hub::new(None));
    let game_count = 200;

    let start = Instant::now();
    let handles: Vec<_> = (0..game_count)
        .map(|i| tokio::spawn(play_game(Arc::clone(&hub), i, i % 4)))
        .collect();

    let mut winners = HashSet::new();
    for handle in handles {
        winners.insert(handle.await.unwrap());
    }
    let elapsed = start.elapsed();

    println!("{} concurrent games took {:?}", game_count, elapsed);

    assert_eq!(winners.len(), game_count);
    assert_eq!(hub.game_count().await, 0);
    assert_eq!(hub.connection_count().await, 0);
    assert!(
        elapsed < Duration::from_secs(10),
        "Concurrent games took too long: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn benchmark_game_creation() {
    let hub = Hub::new(None);
    let creations = 2_000;

    let start = Instant::now();
    let mut ids: HashSet<GameId> = HashSet::new();
    for _ in 0..creations {
        let mut player = Player::connect(&hub).await;
        hub.process_message(player.id, ClientMessage::CreateGame).await;
        match player.next().await {
            ServerMessage::GameCreated { game_id } => {
                assert!(ids.insert(game_id), "Duplicate game id handed out");
            }
            other => panic!("Expected game_created, got {:?}", other),
        }
    }
    let elapsed = start.elapsed();

    println!("Created {} games in {:?}", creations, elapsed);

    assert_eq!(hub.game_count().await, creations);
    assert!(
        elapsed < Duration::from_secs(5),
        "Game creation took too long: {:?}",
        elapsed
    );
}

/// Many connections race to join the same game; exactly one gets the seat.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn benchmark_contended_join() {
    let hub = Arc::new(Hub::new(None));
    let mut creator = Player::connect(&hub).await;
    hub.process_message(creator.id, ClientMessage::CreateGame).await;
    let game_id = match creator.next().await {
        ServerMessage::GameCreated { game_id } => game_id,
        other => panic!("Expected game_created, got {:?}", other),
    };

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let hub = Arc::clone(&hub);
            let game_id = game_id.clone();
            tokio::spawn(async move {
                let mut joiner = Player::connect(&hub).await;
                hub.process_message(joiner.id, ClientMessage::JoinGame { game_id })
                    .await;
                joiner.next().await
            })
        })
        .collect();

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ServerMessage::JoinSuccess => successes += 1,
            ServerMessage::Error { .. } => rejections += 1,
            other => panic!("Unexpected reply to join: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(rejections, 49);
    assert_eq!(creator.next().await, ServerMessage::PlayerJoined);
}
