//! REST API layer: route handlers, DTOs, OpenAPI document, and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; system endpoints and the
//! `/ws` upgrade live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "hyperpage-realtime",
        description = "Publishing API and WebSocket transport for realtime notifications."
    ),
    paths(
        handlers::notify::publish_to_user,
        handlers::notify::deliver_to_user,
        handlers::notify::publish_broadcast,
        handlers::connections::list_connections,
        handlers::system::health_handler,
        handlers::system::commands_handler,
    ),
    components(schemas(
        dto::NotifyRequest,
        dto::NotifyAcceptedResponse,
        dto::DeliveredResponse,
        dto::ConnectionListResponse,
        crate::error::ErrorResponse,
        crate::service::BroadcastReport,
    )),
    tags(
        (name = "Notifications", description = "Publish notifications to connected users"),
        (name = "Connections", description = "Inspect the connection registry"),
        (name = "System", description = "Health and metadata"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST API, WebSocket endpoint, optional
/// Swagger UI, and the HTTP middleware stack.
pub fn build_app(state: AppState) -> Router {
    let router = build_router().route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_notification_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/notifications/broadcast"));
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
    }
}
