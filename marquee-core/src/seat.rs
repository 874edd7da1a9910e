use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seat index within a screen layout (1..=total_seats). Seats are derived
/// from the screen, not persisted as their own rows.
pub type SeatId = u32;

/// Per (show, seat) state. Exactly one variant applies at any instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SeatState {
    Free,
    Held {
        token: Uuid,
        expires_at: DateTime<Utc>,
    },
    Booked {
        booking_id: Uuid,
    },
}

impl SeatState {
    pub fn is_free(&self) -> bool {
        matches!(self, SeatState::Free)
    }
}

/// What a transition expects to find before it may apply. Transitions that
/// meet a different state report the seat as conflicting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatExpectation {
    Free,
    HeldBy(Uuid),
    BookedAs(Uuid),
}

impl SeatExpectation {
    pub fn matches(&self, state: &SeatState) -> bool {
        match (self, state) {
            (SeatExpectation::Free, SeatState::Free) => true,
            (SeatExpectation::HeldBy(token), SeatState::Held { token: held, .. }) => token == held,
            (SeatExpectation::BookedAs(id), SeatState::Booked { booking_id }) => id == booking_id,
            _ => false,
        }
    }
}
