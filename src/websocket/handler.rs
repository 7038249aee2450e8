use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collab::{ConnectionId, CoordinatorHandle};
use crate::models::{ClientMessage, ErrorResponse, Identity, ServerMessage};
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket handler. The credential is checked before the upgrade; a
/// rejected handshake never reaches the coordinator.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt");

    let token = match get_auth_token(&headers, params.token.as_deref()) {
        Ok(token) => token,
        Err(e) => {
            warn!("WebSocket handshake without credential: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Missing credential").into_response();
        }
    };

    let identity = match state.verifier.verify(&token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("WebSocket handshake rejected: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Invalid credential").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Tells the coordinator the connection is gone, however the socket ended.
struct DisconnectGuard {
    coordinator: CoordinatorHandle,
    connection_id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.coordinator.release(self.connection_id);
    }
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let user_id = identity.user_id.clone();
    let (outbox, mut inbox) = mpsc::channel::<ServerMessage>(state.config.outbound_buffer.max(1));

    // Only the coordinator holds a strong sender, so the writer ends when the
    // coordinator lets go of this connection.
    let replies = outbox.downgrade();
    let Some(connection_id) = state.coordinator.connect(identity, outbox).await else {
        warn!(user_id = %user_id, "Coordinator is not running, closing socket");
        return;
    };
    let _guard = DisconnectGuard {
        coordinator: state.coordinator.clone(),
        connection_id,
    };
    info!(user_id = %user_id, connection_id = %connection_id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    // Writer: drain the outbox onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Reader: parse frames and queue them on the coordinator
    let coordinator = state.coordinator.clone();
    let reader_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(user_id = %reader_user, "WebSocket read error: {}", e);
                    break;
                }
            };

            let msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(user_id = %reader_user, "Failed to parse message: {}", e);
                    if let Some(outbox) = replies.upgrade() {
                        let _ = outbox.try_send(ServerMessage::error("invalid-message", e.to_string()));
                    }
                    continue;
                }
            };

            if !coordinator.dispatch(connection_id, msg).await {
                break;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!(user_id = %user_id, connection_id = %connection_id, "WebSocket connection terminated");
}
