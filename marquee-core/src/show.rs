use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A screening of a movie on a screen. At most one show may exist per
/// (screen_id, show_date, show_time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub movie_id: i64,
    pub screen_id: i64,
    pub show_date: NaiveDate,
    pub show_time: NaiveTime,
    pub base_price: f64,
    pub total_seats: u32,
    pub created_at: DateTime<Utc>,
}

impl Show {
    /// Whether a seat index falls inside this show's screen layout.
    pub fn contains_seat(&self, seat_id: u32) -> bool {
        seat_id >= 1 && seat_id <= self.total_seats
    }
}

/// Payload for registering a show. The screen/show CRUD subsystem supplies
/// total_seats and base_price; the store assigns the id.
#[derive(Debug, Clone, Deserialize)]
pub struct NewShow {
    pub movie_id: i64,
    pub screen_id: i64,
    pub show_date: NaiveDate,
    pub show_time: NaiveTime,
    pub base_price: f64,
    pub total_seats: u32,
}
