use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use marquee_core::ReservationError;

#[derive(Debug)]
pub enum ApiError {
    Reservation(ReservationError),
    Internal(anyhow::Error),
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        ApiError::Reservation(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Reservation(err) => match &err {
                ReservationError::ShowNotFound(_) | ReservationError::HoldNotFound(_) => {
                    (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
                }
                ReservationError::InvalidSeatSelection => {
                    (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
                }
                ReservationError::SeatsUnavailable { seat_ids } => (
                    StatusCode::CONFLICT,
                    json!({ "error": err.to_string(), "unavailable_seat_ids": seat_ids }),
                ),
                ReservationError::SeatConflict { seat_ids } => (
                    StatusCode::CONFLICT,
                    json!({ "error": err.to_string(), "conflicting_seat_ids": seat_ids }),
                ),
                ReservationError::HoldExpired(_) | ReservationError::DuplicateShow { .. } => {
                    (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
                }
                ReservationError::Storage(msg) => {
                    tracing::error!("Internal Server Error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "Internal Server Error" }),
                    )
                }
            },
            ApiError::Internal(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
