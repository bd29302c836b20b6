//! Notification handlers: publish to one user, deliver synchronously,
//! broadcast.
//!
//! The CRUD backend calls these after its database write commits. The
//! publishing endpoints only enqueue on the event bus and answer `202`;
//! delivery happens on the dispatcher task.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{DeliveredResponse, NotifyAcceptedResponse, NotifyRequest};
use crate::app_state::AppState;
use crate::domain::{NotificationEvent, UserId};
use crate::error::{ErrorResponse, RealtimeError};

/// `POST /notifications/users/{user_id}` — Queue a notification for a user.
///
/// # Errors
///
/// Returns [`RealtimeError`] on an invalid user id, command, or payload.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/users/{user_id}",
    tag = "Notifications",
    summary = "Queue a notification for one user",
    description = "Validates the command and payload, then publishes it on the event bus. Delivery is best-effort and happens after the response.",
    params(
        ("user_id" = String, Path, description = "Recipient user id"),
    ),
    request_body = NotifyRequest,
    responses(
        (status = 202, description = "Notification queued", body = NotifyAcceptedResponse),
        (status = 400, description = "Invalid user id, command, or payload", body = ErrorResponse),
    )
)]
pub async fn publish_to_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<NotifyRequest>,
) -> Result<impl IntoResponse, RealtimeError> {
    let user_id = UserId::parse(&user_id)?;
    let notification = req.into_notification()?;
    let command = notification.command().to_string();

    let event = NotificationEvent::to_user(user_id.clone(), notification);
    let published_at = event.published_at;
    let receivers = state.event_bus.publish(event);
    if receivers == 0 {
        tracing::warn!(%user_id, %command, "no dispatcher subscribed, notification dropped");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(NotifyAcceptedResponse {
            command,
            recipient: user_id.to_string(),
            receivers,
            published_at,
        }),
    ))
}

/// `POST /notifications/users/{user_id}/deliver` — Deliver immediately.
///
/// # Errors
///
/// Returns [`RealtimeError::NotFound`] when the user has no reachable
/// channel and [`RealtimeError::TransportWrite`] when the write fails.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/users/{user_id}/deliver",
    tag = "Notifications",
    summary = "Deliver a notification synchronously",
    description = "Resolves the user's channel, writes the envelope, and reports the outcome.",
    params(
        ("user_id" = String, Path, description = "Recipient user id"),
    ),
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Notification delivered", body = DeliveredResponse),
        (status = 400, description = "Invalid user id, command, or payload", body = ErrorResponse),
        (status = 404, description = "User not connected", body = ErrorResponse),
        (status = 502, description = "Write to the client failed", body = ErrorResponse),
    )
)]
pub async fn deliver_to_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<NotifyRequest>,
) -> Result<impl IntoResponse, RealtimeError> {
    let user_id = UserId::parse(&user_id)?;
    let notification = req.into_notification()?;
    let command = notification.command().to_string();

    state.notifier.notify_one(&user_id, notification).await?;

    Ok(Json(DeliveredResponse {
        command,
        recipient: user_id.to_string(),
        delivered_at: Utc::now(),
    }))
}

/// `POST /notifications/broadcast` — Queue a notification for everyone.
///
/// # Errors
///
/// Returns [`RealtimeError`] on an invalid command or payload.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/broadcast",
    tag = "Notifications",
    summary = "Queue a broadcast",
    description = "Publishes a notification addressed to every connected user.",
    request_body = NotifyRequest,
    responses(
        (status = 202, description = "Broadcast queued", body = NotifyAcceptedResponse),
        (status = 400, description = "Invalid command or payload", body = ErrorResponse),
    )
)]
pub async fn publish_broadcast(
    State(state): State<AppState>,
    Json(req): Json<NotifyRequest>,
) -> Result<impl IntoResponse, RealtimeError> {
    let notification = req.into_notification()?;
    let command = notification.command().to_string();

    let event = NotificationEvent::to_all(notification);
    let published_at = event.published_at;
    let receivers = state.event_bus.publish(event);

    Ok((
        StatusCode::ACCEPTED,
        Json(NotifyAcceptedResponse {
            command,
            recipient: "*".to_string(),
            receivers,
            published_at,
        }),
    ))
}

/// Notification routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications/users/{user_id}", post(publish_to_user))
        .route(
            "/notifications/users/{user_id}/deliver",
            post(deliver_to_user),
        )
        .route("/notifications/broadcast", post(publish_broadcast))
}
