//! Per-connection lifecycle: the attach handshake, the outbound pump and the
//! inbound message loop.
//!
//! The first frame must be `Attach`. A valid resync token overrides the
//! claimed principal (possession proves identity); without one the claimed
//! id is trusted, because authentication happens at the deployment edge and
//! this service only consumes the resulting principal.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::sending::send_server_message;
use crate::engine::runtime::ActionSubmission;
use crate::protocol::{ClientMessage, ErrorCode, ServerMessage, UserId};
use crate::server::GameServer;

pub(super) async fn handle_socket(socket: WebSocket, server: Arc<GameServer>) {
    let (mut sender, mut receiver) = socket.split();

    // Attach handshake.
    let user_id = loop {
        let Some(Ok(frame)) = receiver.next().await else {
            return;
        };
        let Message::Text(text) = frame else {
            // Ignore pings/pongs before attach.
            continue;
        };
        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Attach {
                user_id,
                resync_token,
            }) => match resync_token {
                Some(token) => match server.verify_resync_token(&token) {
                    Some(verified) => break verified,
                    None => {
                        let _ = send_server_message(
                            &mut sender,
                            &ServerMessage::Error {
                                message: "resync token rejected".to_string(),
                                error_code: Some(ErrorCode::ResyncTokenInvalid),
                            },
                        )
                        .await;
                        let _ = sender.close().await;
                        return;
                    }
                },
                None => break user_id,
            },
            Ok(_) => {
                let _ = send_server_message(
                    &mut sender,
                    &ServerMessage::Error {
                        message: "attach required before any other message".to_string(),
                        error_code: Some(ErrorCode::Unauthorized),
                    },
                )
                .await;
            }
            Err(_) => {
                let _ = send_server_message(
                    &mut sender,
                    &ServerMessage::Error {
                        message: "malformed frame".to_string(),
                        error_code: None,
                    },
                )
                .await;
            }
        }
    };

    let queue_capacity = server.config().engine.push_queue_capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<Arc<ServerMessage>>(queue_capacity);

    let resync_token = server.attach_client(user_id, tx.clone()).await;
    if send_server_message(&mut sender, &ServerMessage::Attached { resync_token })
        .await
        .is_err()
    {
        server.detach_client(&user_id, &tx).await;
        return;
    }

    // Outbound pump: the notifier's queue drains to the socket in order.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if send_server_message(&mut sender, &message).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop.
    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(%user_id, error = %err, "WebSocket receive error");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                let reply = handle_client_message(&server, user_id, text.as_str()).await;
                if let Some(reply) = reply {
                    if tx.send(Arc::new(reply)).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            // Axum answers protocol-level pings itself.
            _ => {}
        }
    }

    server.detach_client(&user_id, &tx).await;
    send_task.abort();
}

async fn handle_client_message(
    server: &Arc<GameServer>,
    user_id: UserId,
    text: &str,
) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(_) => {
            return Some(ServerMessage::Error {
                message: "malformed frame".to_string(),
                error_code: None,
            });
        }
    };

    match message {
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::SubmitAction {
            session_id,
            kind,
            target_id,
            payload,
        } => {
            let submission = ActionSubmission {
                kind,
                target_id,
                payload,
            };
            match server.submit_action(user_id, session_id, submission).await {
                Ok(action_id) => Some(ServerMessage::ActionAccepted {
                    session_id,
                    action_id,
                }),
                Err(err) => Some(ServerMessage::ActionRejected {
                    session_id,
                    error_code: err.error_code(),
                }),
            }
        }
        ClientMessage::FetchView { session_id } => {
            match server.get_session_view(user_id, session_id).await {
                Ok(view) => Some(ServerMessage::View(Box::new(view))),
                Err(err) => Some(ServerMessage::ActionRejected {
                    session_id,
                    error_code: err.error_code(),
                }),
            }
        }
        ClientMessage::Attach { .. } => Some(ServerMessage::Error {
            message: "already attached".to_string(),
            error_code: Some(ErrorCode::Unauthorized),
        }),
    }
}
