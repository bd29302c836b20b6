//! Connection listing.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ConnectionListResponse, PaginationParams};
use crate::app_state::AppState;

/// `GET /connections` — List users with a channel on this instance.
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    tag = "Connections",
    summary = "List connected users",
    description = "Returns a paginated, sorted list of user ids held in this instance's registry, including channels rehydrated from peers.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated user list", body = ConnectionListResponse),
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let registry = state.registry();
    let ids: Vec<String> = registry
        .user_ids()
        .await
        .into_iter()
        .map(String::from)
        .collect();
    let (data, pagination) = params.paginate(ids);

    Json(ConnectionListResponse {
        instance_id: registry.instance_id(),
        data,
        pagination,
    })
}

/// Connection routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/connections", get(list_connections))
}
