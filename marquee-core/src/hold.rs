use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatId;

/// A time-limited claim on a set of seats during checkout. Destroyed on
/// expiry, explicit release, or successful finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatHold {
    pub token: Uuid,
    pub show_id: i64,
    pub seat_ids: Vec<SeatId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatHold {
    pub fn new(show_id: i64, seat_ids: Vec<SeatId>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            token: Uuid::new_v4(),
            show_id,
            seat_ids,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
