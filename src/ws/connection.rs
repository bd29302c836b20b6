//! WebSocket connection loop.
//!
//! Registers a local channel for the user, then forwards queued envelopes
//! to the socket while answering client frames, until either side closes.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use super::messages::handle_client_text;
use crate::domain::{ClientChannel, ConnectionRegistry, UserId};

/// Close code sent when a newer connection for the same user takes over.
const SUPERSEDED: u16 = 4000;

/// Close code sent when the notifier evicted the channel after a failed write.
const EVICTED: u16 = 4001;

/// Close frame for a connection whose outbound queue was closed by the
/// registry, given the connection now registered for the same user.
fn closing_frame(own: Uuid, current: Option<Uuid>) -> CloseFrame {
    match current {
        Some(current) if current != own => CloseFrame {
            code: SUPERSEDED,
            reason: "superseded by a newer connection".into(),
        },
        _ => CloseFrame {
            code: EVICTED,
            reason: "evicted after a failed delivery".into(),
        },
    }
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Forwards frames queued on the user's channel to the client.
/// - Answers client commands.
/// - Removes the registry entry on exit, unless a newer connection owns it.
pub async fn run_connection(
    socket: WebSocket,
    user_id: UserId,
    registry: Arc<ConnectionRegistry>,
    buffer: usize,
) {
    let (channel, mut outbound) = ClientChannel::local(buffer);
    let connection_id = channel.connection_id();
    registry.register(user_id.clone(), channel).await;
    tracing::info!(%user_id, %connection_id, "ws connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_text(text.as_str()).and_then(|e| e.to_text().ok());
                        if let Some(reply) = reply
                            && ws_tx.send(Message::text(reply)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%user_id, error = %e, "ws receive error");
                        break;
                    }
                    _ => {}
                }
            }
            // Frame queued by the notifier
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Every sender is gone: replaced or evicted by the registry.
                        let current = registry.connection_of(&user_id).await;
                        let frame = closing_frame(connection_id, current);
                        tracing::info!(%user_id, %connection_id, code = frame.code, "closing dropped channel");
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        }
    }

    registry.remove(&user_id, connection_id).await;
    tracing::info!(%user_id, %connection_id, "ws connection closed");
}
