//! Server network layer: TCP accept loop, plain HTTP replies, WebSocket
//! upgrade and the idle reaper

use crate::connection::{run_inbound, run_outbound};
use crate::http::{self, Route, HEALTH_BODY, MAX_REQUEST_HEAD};
use crate::hub::Hub;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Upper bound on how often the reaper looks for idle games.
const REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// How long a new connection gets to send its request head.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Aborts the wrapped task when dropped, so the reaper dies with `run`.
struct AbortOnDrop(Option<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Accepts connections and runs one pump per client against a shared hub
pub struct NetworkServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    ws_path: String,
}

impl NetworkServer {
    /// Binds the listener. Failing here is the only fatal server error.
    pub async fn bind(addr: &str, ws_path: impl Into<String>, hub: Arc<Hub>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(NetworkServer {
            listener,
            hub,
            ws_path: ws_path.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns task that periodically expires idle games
    fn spawn_idle_reaper(&self) -> Option<JoinHandle<()>> {
        let timeout = self.hub.idle_timeout()?;
        let hub = Arc::clone(&self.hub);
        let period = timeout.min(REAPER_INTERVAL);

        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let expired = hub.expire_idle_games(Instant::now()).await;
                if !expired.is_empty() {
                    info!("Expired {} idle game(s)", expired.len());
                }
            }
        }))
    }

    /// Main accept loop. Runs until the task is dropped.
    pub async fn run(self) {
        let _reaper = AbortOnDrop(self.spawn_idle_reaper());

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let hub = Arc::clone(&self.hub);
                    let ws_path = self.ws_path.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, hub, &ws_path).await {
                            warn!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Looks at the request head without consuming it.
///
/// Returns what has arrived once the head is complete, the buffer is full or
/// the peer stops sending; an empty result means the peer went away.
async fn peek_request_head(stream: &TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_REQUEST_HEAD];
    let mut seen = 0;

    let peeking = async {
        loop {
            let n = stream.peek(&mut buf).await?;
            if n == 0 || n == buf.len() || http::head_len(&buf[..n]).is_some() {
                return Ok::<usize, io::Error>(n);
            }
            seen = n;
            // peek returns at once while the buffered bytes are unchanged
            sleep(Duration::from_millis(5)).await;
        }
    };

    let peeked = timeout(REQUEST_HEAD_TIMEOUT, peeking).await;
    let n = match peeked {
        Ok(result) => result?,
        Err(_) => seen,
    };
    buf.truncate(n);
    Ok(buf)
}

/// Answers a plain HTTP request and closes the connection.
async fn respond_plain(mut stream: TcpStream, head_len: usize, response: String) -> io::Result<()> {
    // Consume the request first; closing with unread input resets the socket
    let mut request = vec![0u8; head_len];
    stream.read_exact(&mut request).await?;

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Routes one TCP connection: plain HTTP gets a short reply, upgrades are
/// handed to the WebSocket pump.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    ws_path: &str,
) -> Result<(), WsError> {
    let head = peek_request_head(&stream).await?;
    if head.is_empty() {
        debug!("Connection from {} closed before sending a request", addr);
        return Ok(());
    }

    let route = http::parse_request_head(&head)
        .map(|request| http::route(&request, ws_path))
        // Let tungstenite reject anything that is not HTTP
        .unwrap_or(Route::Upgrade);

    let reply = match route {
        Route::Upgrade => return serve_websocket(stream, addr, hub, ws_path).await,
        Route::Health => http::plain_response(StatusCode::OK, HEALTH_BODY),
        Route::Plain(status) => {
            http::plain_response(status, status.canonical_reason().unwrap_or_default())
        }
    };

    let head_len = http::head_len(&head).unwrap_or(head.len());
    debug!("Plain HTTP request from {}, answering {:?}", addr, route);
    respond_plain(stream, head_len, reply).await?;
    Ok(())
}

/// Upgrades one TCP connection and pumps it until either side hangs up.
async fn serve_websocket(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    ws_path: &str,
) -> Result<(), WsError> {
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == ws_path {
            Ok(response)
        } else {
            let mut rejection =
                ErrorResponse::new(Some(format!("No WebSocket endpoint at {}", request.uri().path())));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let socket = accept_hdr_async(stream, check_path).await?;
    let (sink, frames) = socket.split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = hub.register(outbound_tx).await;
    info!("Connection {} established from {}", connection, addr);

    let writer = tokio::spawn(run_outbound(sink, outbound_rx, connection));
    run_inbound(&hub, connection, frames).await;

    if let Err(e) = writer.await {
        error!("Writer for connection {} panicked: {}", connection, e);
    }
    info!("Connection {} from {} closed", connection, addr);
    Ok(())
}
