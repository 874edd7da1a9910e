use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use marquee_core::{Booking, ReservationStore};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CommitBookingRequest {
    hold_token: Uuid,
    /// Authenticated user id, supplied by the auth subsystem upstream.
    user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListBookingsParams {
    user_id: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/commit", post(commit_booking))
        .route("/v1/bookings", get(list_bookings))
}

/// POST /v1/bookings/commit
/// Finalize a hold into a confirmed booking.
async fn commit_booking(
    State(state): State<AppState>,
    Json(req): Json<CommitBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state.finalizer.finalize(req.hold_token, req.user_id).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings
/// List bookings, optionally filtered by user_id via query param.
async fn list_bookings(
    State(state): State<AppState>,
    Query(params): Query<ListBookingsParams>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.store.list_bookings(params.user_id).await?;
    Ok(Json(bookings))
}
