use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use marquee_core::{NewShow, Show};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows", post(create_show))
        .route("/v1/shows/{show_id}", get(get_show).delete(delete_show))
}

/// POST /v1/shows
/// Register a show; the screen subsystem supplies total_seats and price.
async fn create_show(
    State(state): State<AppState>,
    Json(payload): Json<NewShow>,
) -> Result<(StatusCode, Json<Show>), ApiError> {
    let show = state.inventory.register_show(payload).await?;
    Ok((StatusCode::CREATED, Json(show)))
}

/// GET /v1/shows/{show_id}
async fn get_show(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<Show>, ApiError> {
    let show = state.inventory.show(show_id).await?;
    Ok(Json(show))
}

/// DELETE /v1/shows/{show_id}
async fn delete_show(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.inventory.delete_show(show_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
