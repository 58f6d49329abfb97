use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::hub::Hub;
use server::network::NetworkServer;
use std::sync::Arc;

/// Main-method of the application.
/// Loads configuration, binds the listener, then serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    let address = config.address();

    let hub = Arc::new(Hub::new(config.idle_timeout()));
    match config.idle_timeout() {
        Some(timeout) => info!("Idle games expire after {:?}", timeout),
        None => info!("Idle game expiry disabled"),
    }

    info!("Attempting to start server on {}...", address);
    let server = match NetworkServer::bind(&address, config.ws_path.clone(), hub).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            return Err(e.into());
        }
    };
    info!(
        "Accepting WebSocket connections on ws://{}{}",
        server.local_addr()?,
        config.ws_path
    );

    let server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Network task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
