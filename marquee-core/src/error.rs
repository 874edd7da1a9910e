use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::seat::SeatId;

/// Client-facing reservation failures. All variants except `Storage` map to
/// 4xx responses; seat-carrying variants include the offending ids so the
/// client can re-prompt seat selection.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Show not found: {0}")]
    ShowNotFound(i64),

    #[error("A show already exists for screen {screen_id} at {show_date} {show_time}")]
    DuplicateShow {
        screen_id: i64,
        show_date: NaiveDate,
        show_time: NaiveTime,
    },

    #[error("Invalid seat selection")]
    InvalidSeatSelection,

    #[error("Seats unavailable: {seat_ids:?}")]
    SeatsUnavailable { seat_ids: Vec<SeatId> },

    #[error("Hold not found: {0}")]
    HoldNotFound(Uuid),

    #[error("Hold expired: {0}")]
    HoldExpired(Uuid),

    #[error("Seat state changed concurrently: {seat_ids:?}")]
    SeatConflict { seat_ids: Vec<SeatId> },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReservationError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        ReservationError::Storage(err.to_string())
    }
}
