use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::RelayState;
use crate::protocol::{decode_message, encode_message, ClientMessage, ServerMessage};

/// Handles WebSocket connections for individual clients
pub struct WebSocketHandler {
    socket: WebSocket,
    state: RelayState,
    query: Option<String>,
}

impl WebSocketHandler {
    /// Create a new WebSocket handler for a socket upgraded with the given raw query string
    pub fn new(socket: WebSocket, state: RelayState, query: Option<String>) -> Self {
        Self {
            socket,
            state,
            query,
        }
    }

    /// Handle the WebSocket connection until either side closes it
    pub async fn handle(self) {
        let (mut ws_sender, mut ws_receiver) = self.socket.split();

        // Outbound queue for this client, drained by the sender task
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let connection_id = Uuid::new_v4().to_string();

        info!(
            "New WebSocket connection established for client {}",
            connection_id
        );

        // Spawn task to send messages to the WebSocket
        let mut sender_task = {
            let connection_id = connection_id.clone();
            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    match encode_message(&message) {
                        Ok(encoded) => {
                            if let Err(e) = ws_sender.send(Message::Binary(encoded.into())).await {
                                warn!(
                                    "Failed to send {} to client {}: {}",
                                    message.event_name(),
                                    connection_id,
                                    e
                                );
                                break;
                            }
                        }
                        Err(e) => {
                            error!(
                                "Failed to encode {} for client {}: {}",
                                message.event_name(),
                                connection_id,
                                e
                            );
                        }
                    }
                }
                debug!("Sender task ended for client {}", connection_id);
            })
        };

        // Join the room before reading any update from this client
        self.state
            .relay()
            .connect(connection_id.clone(), self.query.as_deref(), tx)
            .await;

        // Handle incoming messages from the WebSocket
        let mut receiver_task = {
            let state = self.state.clone();
            let connection_id = connection_id.clone();

            tokio::spawn(async move {
                while let Some(msg) = ws_receiver.next().await {
                    match msg {
                        Ok(Message::Binary(data)) => {
                            handle_client_message(&state, &connection_id, &data).await;
                        }
                        Ok(Message::Text(text)) => {
                            warn!(
                                "Ignoring unexpected text frame ({} bytes) from client {}",
                                text.as_str().len(),
                                connection_id
                            );
                        }
                        Ok(Message::Close(_)) => {
                            info!("Client {} closed connection normally", connection_id);
                            break;
                        }
                        Ok(Message::Ping(_)) => {
                            // Axum answers pings automatically
                            debug!("Received ping from client {}", connection_id);
                        }
                        Ok(Message::Pong(_)) => {
                            debug!("Received pong from client {}", connection_id);
                        }
                        Err(e) => {
                            warn!("WebSocket error for client {}: {}", connection_id, e);
                            break;
                        }
                    }
                }
                debug!("Receiver task ended for client {}", connection_id);
            })
        };

        // Wait for either task to complete (indicating connection should close)
        let completion_reason = tokio::select! {
            _ = &mut sender_task => "sender task completed",
            _ = &mut receiver_task => "receiver task completed",
        };

        info!(
            "WebSocket connection ending for client {} ({})",
            connection_id, completion_reason
        );

        receiver_task.abort();
        self.state.relay().disconnect(&connection_id).await;
        sender_task.abort();

        info!(
            "Client {} fully disconnected and cleaned up",
            connection_id
        );
    }
}

/// Handle a binary frame from a client.
///
/// Frames that cannot be decoded are logged and dropped; the client never
/// receives an error.
async fn handle_client_message(state: &RelayState, connection_id: &str, data: &[u8]) {
    let message: ClientMessage = match decode_message(data) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Dropping undecodable frame ({} bytes) from client {}: {}",
                data.len(),
                connection_id,
                e
            );
            return;
        }
    };

    let (kind, payload) = message.into_update();
    state
        .relay()
        .relay_update(connection_id, kind, payload)
        .await;
}
