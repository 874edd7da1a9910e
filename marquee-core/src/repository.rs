use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::booking::Booking;
use crate::error::ReservationError;
use crate::hold::SeatHold;
use crate::seat::{SeatExpectation, SeatId, SeatState};
use crate::show::{NewShow, Show};

/// Result of an atomic multi-seat transition. Either every requested seat
/// moved to the target state or none did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Conflict { seat_ids: Vec<SeatId> },
}

/// Single-winner claim on a hold record. Claiming removes the record, so a
/// finalize and a sweep racing on the same hold cannot both succeed.
#[derive(Debug)]
pub enum HoldClaim {
    Claimed(SeatHold),
    Expired,
    NotFound,
}

/// Transactional store behind the reservation engine. Seat-state mutations
/// go through `try_transition` only; no caller may read-then-write seat
/// state across separate store calls.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn register_show(&self, show: NewShow) -> Result<Show, ReservationError>;

    async fn get_show(&self, show_id: i64) -> Result<Option<Show>, ReservationError>;

    async fn delete_show(&self, show_id: i64) -> Result<bool, ReservationError>;

    /// Atomically move every seat in `seat_ids` from `expected` to `to`,
    /// or report the seats whose current state does not match.
    async fn try_transition(
        &self,
        show_id: i64,
        seat_ids: &[SeatId],
        expected: SeatExpectation,
        to: SeatState,
    ) -> Result<TransitionOutcome, ReservationError>;

    /// Current state of every seat of the show, keyed by seat id.
    async fn snapshot(
        &self,
        show_id: i64,
    ) -> Result<BTreeMap<SeatId, SeatState>, ReservationError>;

    async fn insert_hold(&self, hold: &SeatHold) -> Result<(), ReservationError>;

    async fn get_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError>;

    /// Claim an unexpired hold for finalization. Expired holds are left in
    /// place for the sweeper.
    async fn claim_hold(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<HoldClaim, ReservationError>;

    /// Remove a hold unconditionally, returning it if it still existed.
    async fn remove_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError>;

    /// Claim every hold past its expiry, removing the records.
    async fn claim_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeatHold>, ReservationError>;

    async fn insert_booking(&self, booking: &Booking) -> Result<(), ReservationError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError>;

    async fn list_bookings(
        &self,
        user_id: Option<i64>,
    ) -> Result<Vec<Booking>, ReservationError>;
}
