//! Frame serialization for the push channel.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;

use crate::protocol::ServerMessage;

/// Serialize and send one message on the socket sink.
pub(super) async fn send_server_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            // A message that cannot serialize is a programming error; drop
            // the frame, keep the connection.
            tracing::error!(error = %err, "Failed to serialize server message");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
