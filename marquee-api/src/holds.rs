use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marquee_core::SeatId;
use marquee_reserve::HoldGrant;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct PlaceHoldRequest {
    seat_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct SeatStatusResponse {
    show_id: i64,
    unavailable_seat_ids: Vec<SeatId>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows/{show_id}/holds", post(place_hold))
        .route("/v1/holds/{token}", delete(release_hold))
        .route("/v1/shows/{show_id}/booking-seats", get(seat_status))
}

/// POST /v1/shows/{show_id}/holds
/// Hold seats during selection. All requested seats are held under one
/// token, or the unavailable seats come back in a 409.
async fn place_hold(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<PlaceHoldRequest>,
) -> Result<Json<HoldGrant>, ApiError> {
    let grant = state.holds.place_hold(show_id, &req.seat_ids).await?;
    Ok(Json(grant))
}

/// DELETE /v1/holds/{token}
/// Release a hold. Always 204: releasing an unknown or already-finalized
/// token is a no-op.
async fn release_hold(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.holds.release_hold(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/shows/{show_id}/booking-seats
/// Sorted ids of every seat currently held or booked.
async fn seat_status(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<SeatStatusResponse>, ApiError> {
    let unavailable_seat_ids = state.inventory.unavailable_seats(show_id).await?;
    Ok(Json(SeatStatusResponse {
        show_id,
        unavailable_seat_ids,
    }))
}
