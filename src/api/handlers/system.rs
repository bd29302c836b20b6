//! System endpoints: health check and command catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    /// Registry entries on this instance.
    connections: usize,
    /// Dispatchers subscribed to the event bus.
    bus_receivers: usize,
}

/// `GET /health` — Service health status.
///
/// Reports `degraded` with `503` when no dispatcher is draining the bus,
/// since published notifications would be dropped.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp, connection count and event bus receivers.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "No dispatcher on the event bus", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let bus_receivers = state.event_bus.receiver_count();
    let (status, label) = if bus_receivers == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections: state.registry().len().await,
            bus_receivers,
        }),
    )
}

/// Known command tag info.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommandInfo {
    command: &'static str,
    description: &'static str,
    payload: &'static str,
}

/// `GET /config/commands` — List command tags with typed payloads.
#[utoipa::path(
    get,
    path = "/config/commands",
    tag = "System",
    summary = "List known commands",
    description = "Returns the command tags the service validates. Any other tag is forwarded with its payload as-is.",
    responses(
        (status = 200, description = "Command catalog", body = Vec<CommandInfo>),
    )
)]
pub async fn commands_handler() -> impl IntoResponse {
    let commands = vec![
        CommandInfo {
            command: "Activated",
            description: "Account activation completed",
            payload: "none",
        },
        CommandInfo {
            command: "BalanceAdded",
            description: "Wallet balance credited",
            payload: "none",
        },
        CommandInfo {
            command: "newDonat",
            description: "New donations received",
            payload: "[{name, total, msg}]",
        },
        CommandInfo {
            command: "newblog",
            description: "Blog count changed",
            payload: "live blog total, computed at send time",
        },
        CommandInfo {
            command: "newComment",
            description: "Comment added to a post",
            payload: "{postId, comment}",
        },
        CommandInfo {
            command: "likeUpdate",
            description: "Like toggled on a post",
            payload: "{postId, userId, isLiked}",
        },
        CommandInfo {
            command: "newPost",
            description: "Post published",
            payload: "{post}",
        },
        CommandInfo {
            command: "deletePost",
            description: "Post deleted",
            payload: "{postId}",
        },
        CommandInfo {
            command: "deleteComment",
            description: "Comment deleted",
            payload: "{postId, commentId}",
        },
        CommandInfo {
            command: "updatePost",
            description: "Post body edited",
            payload: "{postId, content}",
        },
    ];
    (StatusCode::OK, Json(commands))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/commands", get(commands_handler))
}
