//! Multi-client WebSocket chat server - Entry Point
//!
//! Starts the ChatServer actor, the heartbeat and stats tasks, the HTTP
//! diagnostics server, and the WebSocket accept loop.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatroom::{handle_connection, heartbeat, http, ChatServer, Config};

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chatroom=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatroom=info")),
        )
        .init();

    let config = Config::from_env();

    // Start TCP listener for WebSocket connections
    let listener = TcpListener::bind(&config.ws_addr).await?;
    info!("WebSocket chat server listening on {}", config.ws_addr);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = ChatServer::new(cmd_rx, &config);
    tokio::spawn(server.run());

    // Periodic tasks: heartbeat sweep and stats log line
    tokio::spawn(heartbeat::run_heartbeat(
        cmd_tx.clone(),
        config.heartbeat_interval,
    ));
    tokio::spawn(heartbeat::run_stats_logger(cmd_tx.clone()));

    // HTTP diagnostics surface on its own address
    let http_addr = config.http_addr.clone();
    let http_cmd_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = http::run_http_server(http_addr, http_cmd_tx).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("ChatServer actor started");

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
