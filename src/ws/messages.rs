//! Inbound WebSocket frames and their replies.
//!
//! Outbound traffic is the [`Envelope`] shape; clients use the same shape
//! for the few commands they may send.

use serde::Deserialize;
use serde_json::json;

use crate::domain::Envelope;

/// Commands a client can send over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Application-level keepalive.
    Ping,
}

/// Handles a text frame from the client, returning an optional reply.
///
/// Unknown commands are ignored; malformed JSON gets an error envelope.
#[must_use]
pub fn handle_client_text(text: &str) -> Option<Envelope> {
    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value,
        Err(_) => {
            return Some(Envelope {
                command: "error".to_string(),
                data: Some(json!({ "message": "malformed JSON" })),
            });
        }
    };

    match serde_json::from_value::<ClientCommand>(value) {
        Ok(ClientCommand::Ping) => Some(Envelope::bare("pong")),
        Err(_) => {
            tracing::debug!(
                frame = %text.chars().take(100).collect::<String>(),
                "ignoring unknown client command"
            );
            None
        }
    }
}
