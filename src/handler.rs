//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, the
//! welcome frame, and bidirectional plumbing between the socket and the
//! ChatServer actor. Inbound text is forwarded raw; parsing and
//! validation belong to the router so a malformed frame gets a proper
//! `error` reply instead of being dropped here.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::message::{OutboundFrame, ServerFrame, WelcomeData};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Outbound frame buffer per connection
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, registers with the actor, sends the
/// welcome frame, and pumps frames in both directions until either side
/// closes. The `Disconnect` command fires exactly once, on the way out.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Channel for serialized server -> client frames
    let (msg_tx, mut msg_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER_SIZE);

    // Register with the ChatServer actor
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    // Welcome frame, sent once at connect
    let welcome = OutboundFrame::new(ServerFrame::Welcome(WelcomeData::new(client_id)));
    ws_sender.send(Message::Text(welcome.to_json()?.into())).await?;

    let cmd_tx_read = cmd_tx.clone();

    // Read task (WebSocket -> ServerCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let cmd = ServerCommand::Inbound {
                        client_id,
                        raw: text.to_string(),
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Server closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Transport ping from {}", client_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Transport pong from {}", client_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Write task (serialized frame -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(text) = msg_rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                debug!("WebSocket send failed, ending write task");
                break;
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    // Signal disconnection once; the actor's removal is idempotent even
    // if close and error raced on the socket
    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}
