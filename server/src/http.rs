//! Minimal reading of the HTTP request head that precedes every connection.
//!
//! Only enough is parsed to tell a WebSocket upgrade apart from a plain
//! request; the upgrade itself is left to tungstenite.

use tokio_tungstenite::tungstenite::http::StatusCode;

/// Body served on `GET /` so hosting platforms can probe liveness.
pub const HEALTH_BODY: &str = "Bulls & Cows backend is running!";

/// Largest request head the server will look at before deciding a route.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// `Upgrade: websocket` was present
    pub upgrade: bool,
}

/// Where a connection goes once its request head is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Upgrade,
    Health,
    Plain(StatusCode),
}

/// Byte length of the head including its blank line, once it is complete.
pub fn head_len(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parses the request line and looks for an upgrade header.
pub fn parse_request_head(bytes: &[u8]) -> Option<RequestHead> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut lines = text.split("\r\n");

    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?;
    request_line.next().filter(|version| version.starts_with("HTTP/"))?;

    let path = target.split('?').next().unwrap_or(target).to_string();

    let upgrade = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .any(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
        });

    Some(RequestHead {
        method,
        path,
        upgrade,
    })
}

/// Decides how to answer a request on a server whose upgrades live at `ws_path`.
pub fn route(head: &RequestHead, ws_path: &str) -> Route {
    if head.upgrade {
        // tungstenite answers 404 itself for the wrong path
        return Route::Upgrade;
    }

    match (head.method.as_str(), head.path.as_str()) {
        ("GET", "/") => Route::Health,
        (_, path) if path == ws_path => Route::Plain(StatusCode::BAD_REQUEST),
        _ => Route::Plain(StatusCode::NOT_FOUND),
    }
}

/// A complete `Connection: close` response with a text body.
pub fn plain_response(status: StatusCode, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPGRADE: &[u8] = b"GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_head_len_waits_for_blank_line() {
        assert_eq!(head_len(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
        assert_eq!(head_len(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
    }

    #[test]
    fn test_parse_upgrade_request() {
        let head = parse_request_head(UPGRADE).unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/ws");
        assert!(head.upgrade);
        assert_eq!(route(&head, "/ws"), Route::Upgrade);
    }

    #[test]
    fn test_upgrade_header_is_case_insensitive() {
        let head =
            parse_request_head(b"GET /ws HTTP/1.1\r\nUPGRADE: WebSocket\r\n\r\n").unwrap();
        assert!(head.upgrade);
    }

    #[test]
    fn test_plain_root_is_health() {
        let head = parse_request_head(b"GET /?probe=1 HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(head.path, "/");
        assert!(!head.upgrade);
        assert_eq!(route(&head, "/ws"), Route::Health);
    }

    #[test]
    fn test_other_plain_requests() {
        let ws_without_upgrade = parse_request_head(b"GET /ws HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(
            route(&ws_without_upgrade, "/ws"),
            Route::Plain(StatusCode::BAD_REQUEST)
        );

        let unknown = parse_request_head(b"GET /favicon.ico HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(route(&unknown, "/ws"), Route::Plain(StatusCode::NOT_FOUND));

        let post_root = parse_request_head(b"POST / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(route(&post_root, "/ws"), Route::Plain(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_garbage_is_not_a_request() {
        assert_eq!(parse_request_head(b"\x16\x03\x01\x00"), None);
        assert_eq!(parse_request_head(b"hello\r\n\r\n"), None);
    }

    #[test]
    fn test_plain_response_format() {
        let response = plain_response(StatusCode::OK, HEALTH_BODY);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains(&format!("Content-Length: {}\r\n", HEALTH_BODY.len())));
        assert!(response.ends_with(&format!("\r\n\r\n{}", HEALTH_BODY)));
    }
}
