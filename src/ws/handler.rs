//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::RealtimeError;

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// User the connection belongs to.
    pub user_id: String,
}

/// `GET /ws?user_id=...` — Upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidRequest`] for an invalid user id.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Result<impl IntoResponse, RealtimeError> {
    let user_id = UserId::parse(&params.user_id)?;
    let registry = Arc::clone(state.registry());
    let buffer = state.client_buffer;

    Ok(ws.on_upgrade(move |socket| run_connection(socket, user_id, registry, buffer)))
}
