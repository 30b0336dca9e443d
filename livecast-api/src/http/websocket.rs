//! Signaling WebSocket
//!
//! One socket per participant. Text frames carry JSON signaling messages;
//! everything the relay queues for this connection is written back as text.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use livecast_core::models::{ConnectionId, UserId};
use tracing::{debug, error, info, warn};

use crate::http::{middleware::AuthUser, AppState};

/// GET /ws
///
/// The user id header is optional here; when present the connection may
/// host with an older key of its own.
pub async fn websocket_handler(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_message_bytes = state.config.signaling.max_message_bytes;
    let user = auth.map(|auth| auth.user_id);
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: Option<UserId>) {
    let conn = ConnectionId::new();
    let relay = state.relay.clone();
    let authenticated = user.is_some();
    let mut outbound = relay.connect_as(conn.clone(), user);
    info!(connection_id = %conn, authenticated, "WebSocket connection established");

    let (mut sink, mut stream) = socket.split();

    let writer_conn = conn.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(connection_id = %writer_conn, error = %e, "Failed to encode signaling message");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(connection_id = %writer_conn, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => relay.handle_text(&conn, text.as_str()).await,
            Ok(Message::Binary(_)) => debug!(connection_id = %conn, "Ignoring binary frame"),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(connection_id = %conn, error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    relay.disconnect(&conn).await;
    writer.abort();
    info!(connection_id = %conn, "WebSocket connection closed");
}
