use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

/// A finalized seat purchase. Created only by finalizing a valid, unexpired
/// hold covering exactly the booked seats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Option<i64>,
    pub show_id: i64,
    pub seat_ids: Vec<SeatId>,
    pub booking_reference: String,
    pub final_amount: f64,
    pub booking_status: BookingStatus,
    pub created_at: DateTime<Utc>,
}
