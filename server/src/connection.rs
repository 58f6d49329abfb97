//! The two loops servicing one WebSocket connection.
//!
//! The reader decodes frames and hands them to the hub one at a time; the
//! writer drains the connection's outbound queue onto the socket. Nothing but
//! the writer touches the write half, so the hub can queue notifications for
//! any connection without racing on its transport.

use crate::client_manager::ConnectionId;
use crate::hub::Hub;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, warn};
use shared::{decode_client_bytes, decode_client_message, encode_server_message, ServerMessage};
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Reads frames until the peer goes away, then unregisters the connection.
///
/// Malformed frames are dropped one at a time without touching any game.
pub async fn run_inbound<S>(hub: &Hub, connection: ConnectionId, mut frames: S)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => decode_client_message(&text),
            Ok(Message::Binary(bytes)) => decode_client_bytes(&bytes),
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close", connection);
                break;
            }
            // Pings are answered by the transport itself
            Ok(_) => continue,
            Err(
                WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake),
            ) => {
                debug!("Connection {} dropped", connection);
                break;
            }
            Err(e) => {
                warn!("Read error on connection {}: {}", connection, e);
                break;
            }
        };

        match decoded {
            Ok(message) => hub.process_message(connection, message).await,
            Err(e) => warn!("Dropping frame from connection {}: {}", connection, e),
        }
    }

    hub.unregister(connection).await;
}

/// Writes queued notifications until the hub closes the queue, then closes
/// the socket. Stops early on the first write failure.
pub async fn run_outbound<K>(
    mut sink: K,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
    connection: ConnectionId,
) where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    while let Some(notification) = outbound.recv().await {
        let text = match encode_server_message(&notification) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {:?} for connection {}: {}", notification, connection, e);
                continue;
            }
        };

        if let Err(e) = sink.send(Message::text(text)).await {
            warn!("Write error on connection {}: {}", connection, e);
            return;
        }
    }

    debug!("Outbound queue for connection {} closed", connection);
    if let Err(e) = sink.close().await {
        debug!("Closing connection {} failed: {}", connection, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use shared::{decode_server_message, GameId};

    fn text(frame: &str) -> Result<Message, WsError> {
        Ok(Message::text(frame.to_string()))
    }

    fn decode_all(frames: Vec<Message>) -> Vec<ServerMessage> {
        frames
            .into_iter()
            .map(|frame| match frame {
                Message::Text(text) => decode_server_message(&text).unwrap(),
                other => panic!("Unexpected frame: {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_outbound_writes_in_order_then_closes() {
        let (sink, sink_rx) = futures_channel::mpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ServerMessage::JoinSuccess).unwrap();
        tx.send(ServerMessage::OpponentGuess {
            guess: "1234".to_string(),
        })
        .unwrap();
        drop(tx);

        run_outbound(sink, rx, ConnectionId(1)).await;

        let frames: Vec<Message> = sink_rx.collect().await;
        assert_eq!(
            decode_all(frames),
            vec![
                ServerMessage::JoinSuccess,
                ServerMessage::OpponentGuess {
                    guess: "1234".to_string()
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_outbound_stops_on_write_error() {
        let (sink, sink_rx) = futures_channel::mpsc::unbounded::<Message>();
        drop(sink_rx);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ServerMessage::PlayerJoined).unwrap();

        // returns even though the queue is still open
        run_outbound(sink, rx, ConnectionId(1)).await;

        assert!(tx.send(ServerMessage::PlayerJoined).is_err());
    }

    #[tokio::test]
    async fn test_inbound_dispatches_and_unregisters() {
        let hub = Hub::new(None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = hub.register(tx).await;

        let frames = stream::iter(vec![
            text(r#"{"Type":"create_game"}"#),
            Ok(Message::Ping(Default::default())),
        ]);
        run_inbound(&hub, connection, frames).await;

        match rx.recv().await {
            Some(ServerMessage::GameCreated { game_id }) => {
                assert!(game_id.as_str().starts_with("GAME"));
            }
            other => panic!("Expected game_created, got {:?}", other),
        }
        // unregistered: the game is gone and the queue is closed
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.game_count().await, 0);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_inbound_skips_malformed_frames() {
        let hub = Hub::new(None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = hub.register(tx).await;

        let frames = stream::iter(vec![
            text("not json"),
            text(r#"{"Type":"fly_away","Payload":{}}"#),
            text(r#"{"Type":"join_game","Payload":{}}"#),
            Ok(Message::binary(
                br#"{"Type":"join_game","Payload":{"game_id":"GAMEXXXX"}}"#.to_vec(),
            )),
        ]);
        run_inbound(&hub, connection, frames).await;

        // only the well-formed join reaches the hub
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Error {
                message: "Game not found or full".to_string()
            })
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_inbound_stops_at_close_frame() {
        let hub = Hub::new(None);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let creator = hub.register(tx1).await;
        let joiner = hub.register(tx2).await;

        hub.process_message(creator, shared::ClientMessage::CreateGame)
            .await;
        let game_id: GameId = match rx1.recv().await {
            Some(ServerMessage::GameCreated { game_id }) => game_id,
            other => panic!("Expected game_created, got {:?}", other),
        };

        let join = format!(
            r#"{{"Type":"join_game","Payload":{{"game_id":"{}"}}}}"#,
            game_id
        );
        let frames = stream::iter(vec![
            text(&join),
            Ok(Message::Close(None)),
            text(r#"{"Type":"create_game"}"#),
        ]);
        run_inbound(&hub, joiner, frames).await;

        assert_eq!(rx2.recv().await, Some(ServerMessage::JoinSuccess));
        assert!(rx2.recv().await.is_none());

        assert_eq!(rx1.recv().await, Some(ServerMessage::PlayerJoined));
        assert_eq!(rx1.recv().await, Some(ServerMessage::OpponentDisconnected));
        assert_eq!(hub.game_count().await, 0);
    }

    #[tokio::test]
    async fn test_inbound_unregisters_on_transport_error() {
        let hub = Hub::new(None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = hub.register(tx).await;

        let frames = stream::iter(vec![
            Err(WsError::ConnectionClosed),
            text(r#"{"Type":"create_game"}"#),
        ]);
        run_inbound(&hub, connection, frames).await;

        assert!(rx.recv().await.is_none());
        assert_eq!(hub.game_count().await, 0);
    }
}
