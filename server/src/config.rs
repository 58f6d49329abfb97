use clap::Parser;
use std::time::Duration;

/// Command line and environment configuration.
///
/// Every flag can also come from the environment (or a `.env` file loaded
/// before parsing).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Session server for two-player Bulls & Cows")]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "8001")]
    pub port: u16,

    /// HTTP path that accepts WebSocket upgrades
    #[arg(long, env = "WS_PATH", default_value = "/ws")]
    pub ws_path: String,

    /// Seconds without activity before a game is expired (0 disables)
    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value = "900")]
    pub idle_timeout_secs: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_flags() {
        let config = ServerConfig::try_parse_from([
            "server",
            "-H",
            "127.0.0.1",
            "-p",
            "9000",
            "--ws-path",
            "/play",
            "--idle-timeout-secs",
            "60",
        ])
        .unwrap();

        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.ws_path, "/play");
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_disables_idle_timeout() {
        let config =
            ServerConfig::try_parse_from(["server", "--idle-timeout-secs", "0"]).unwrap();
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = ServerConfig::try_parse_from(["server", "--port", "99999"]);
        assert!(result.is_err());
    }
}
