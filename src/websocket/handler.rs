//! WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::connection::handle_socket;
use crate::server::GameServer;

/// `GET /v1/ws`: upgrade and hand the socket to the connection loop.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(server): State<Arc<GameServer>>,
) -> impl IntoResponse {
    let max_message_size = server.config().security.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, server))
}
