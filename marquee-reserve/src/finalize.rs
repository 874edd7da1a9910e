use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use marquee_core::{
    Booking, BookingStatus, HoldClaim, ReservationError, ReservationStore, SeatExpectation,
    SeatHold, SeatState, TransitionOutcome,
};

use crate::holds::release_hold_seats;
use crate::inventory::SeatInventory;

const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERENCE_LEN: usize = 6;
const INSERT_ATTEMPTS: usize = 3;

/// Booking Finalizer: converts a valid, unexpired hold into a confirmed
/// booking, or fails without partial effects.
#[derive(Clone)]
pub struct BookingFinalizer {
    inventory: SeatInventory,
}

impl BookingFinalizer {
    pub fn new(inventory: SeatInventory) -> Self {
        Self { inventory }
    }

    /// Claim the hold (single winner against the sweeper), move its seats
    /// to Booked, and persist the booking as `confirmed`.
    pub async fn finalize(
        &self,
        token: Uuid,
        user_id: Option<i64>,
    ) -> Result<Booking, ReservationError> {
        let store = self.inventory.store();

        let hold = match store.claim_hold(token, Utc::now()).await? {
            HoldClaim::Claimed(hold) => hold,
            HoldClaim::Expired => return Err(ReservationError::HoldExpired(token)),
            HoldClaim::NotFound => return Err(ReservationError::HoldNotFound(token)),
        };

        let show = self.inventory.show(hold.show_id).await?;
        let booking_id = Uuid::new_v4();

        let outcome = self
            .inventory
            .transition(
                hold.show_id,
                &hold.seat_ids,
                SeatExpectation::HeldBy(token),
                SeatState::Booked { booking_id },
            )
            .await?;
        if let TransitionOutcome::Conflict { seat_ids } = outcome {
            // Unreachable while the hold manager's invariants stand; the
            // claimed record is gone, so free whatever the token still
            // covers instead of stranding it.
            release_hold_seats(&self.inventory, &hold).await;
            return Err(ReservationError::SeatConflict { seat_ids });
        }

        let mut booking = Booking {
            id: booking_id,
            user_id,
            show_id: hold.show_id,
            seat_ids: hold.seat_ids.clone(),
            booking_reference: booking_reference(),
            final_amount: show.base_price * hold.seat_ids.len() as f64,
            booking_status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };

        // A reference collision surfaces as a unique-violation storage
        // error; a fresh reference resolves it.
        let mut attempts = 0;
        loop {
            match store.insert_booking(&booking).await {
                Ok(()) => break,
                Err(err) => {
                    attempts += 1;
                    if attempts >= INSERT_ATTEMPTS {
                        self.restore_hold(&hold, booking_id).await;
                        return Err(err);
                    }
                    warn!(
                        "Booking insert failed, regenerating reference: {}",
                        err
                    );
                    booking.booking_reference = booking_reference();
                }
            }
        }

        info!(
            "Booking {} confirmed: show {}, seats {:?}, amount {:.2}",
            booking.booking_reference, booking.show_id, booking.seat_ids, booking.final_amount
        );
        Ok(booking)
    }

    /// The seats moved to Booked but no booking row exists. Put them back
    /// under the hold so the client can retry or the sweeper can reclaim;
    /// if even the record cannot be restored, free them outright.
    async fn restore_hold(&self, hold: &SeatHold, booking_id: Uuid) {
        let expected = SeatExpectation::BookedAs(booking_id);
        let store = self.inventory.store();

        let target = match store.insert_hold(hold).await {
            Ok(()) => SeatState::Held {
                token: hold.token,
                expires_at: hold.expires_at,
            },
            Err(err) => {
                warn!(
                    "Failed to restore hold {} after booking insert failure: {}",
                    hold.token, err
                );
                SeatState::Free
            }
        };

        match self
            .inventory
            .transition(hold.show_id, &hold.seat_ids, expected, target)
            .await
        {
            Ok(TransitionOutcome::Applied) => {}
            Ok(TransitionOutcome::Conflict { seat_ids }) => warn!(
                "Seats {:?} of failed booking {} changed state concurrently",
                seat_ids, booking_id
            ),
            Err(err) => warn!(
                "Failed to return seats of failed booking {}: {}",
                booking_id, err
            ),
        }
    }
}

/// Reference code in the original ticketing format: BMS- plus six uppercase
/// alphanumerics.
fn booking_reference() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..REFERENCE_LEN)
        .map(|_| REFERENCE_CHARSET[rng.random_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("BMS-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holds::HoldManager;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveTime};
    use marquee_core::{NewShow, SeatId, Show};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn setup() -> (SeatInventory, HoldManager, BookingFinalizer, i64) {
        setup_with(Arc::new(MemoryStore::new())).await
    }

    async fn setup_with(
        store: Arc<dyn ReservationStore>,
    ) -> (SeatInventory, HoldManager, BookingFinalizer, i64) {
        let inventory = SeatInventory::new(store);
        let show = inventory
            .register_show(NewShow {
                movie_id: 1,
                screen_id: 1,
                show_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                show_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
                base_price: 250.0,
                total_seats: 100,
            })
            .await
            .unwrap();
        let manager = HoldManager::new(inventory.clone(), chrono::Duration::minutes(3));
        let finalizer = BookingFinalizer::new(inventory.clone());
        (inventory, manager, finalizer, show.id)
    }

    #[tokio::test]
    async fn test_finalize_confirms_booking() {
        let (inventory, manager, finalizer, show_id) = setup().await;
        let grant = manager.place_hold(show_id, &[1, 2, 3]).await.unwrap();

        let booking = finalizer.finalize(grant.token, Some(42)).await.unwrap();
        assert_eq!(booking.final_amount, 750.0);
        assert_eq!(booking.booking_status, BookingStatus::Confirmed);
        assert_eq!(booking.seat_ids, vec![1, 2, 3]);
        assert_eq!(booking.user_id, Some(42));
        assert!(booking.booking_reference.starts_with("BMS-"));
        assert_eq!(booking.booking_reference.len(), 4 + REFERENCE_LEN);

        let snapshot = inventory.snapshot(show_id).await.unwrap();
        for seat_id in [1, 2, 3] {
            assert_eq!(
                snapshot[&seat_id],
                SeatState::Booked {
                    booking_id: booking.id
                }
            );
        }
    }

    #[tokio::test]
    async fn test_finalize_unknown_token_fails() {
        let (_, _, finalizer, _) = setup().await;
        let token = Uuid::new_v4();
        let err = finalizer.finalize(token, None).await.unwrap_err();
        assert!(matches!(err, ReservationError::HoldNotFound(t) if t == token));
    }

    #[tokio::test]
    async fn test_finalize_expired_hold_fails() {
        let (_, manager, finalizer, show_id) = setup().await;
        let grant = manager
            .place_hold_with_ttl(show_id, &[4], chrono::Duration::milliseconds(-1))
            .await
            .unwrap();

        let err = finalizer.finalize(grant.token, None).await.unwrap_err();
        assert!(matches!(err, ReservationError::HoldExpired(_)));
    }

    #[tokio::test]
    async fn test_finalize_twice_never_double_books() {
        let (_, manager, finalizer, show_id) = setup().await;
        let grant = manager.place_hold(show_id, &[1, 2]).await.unwrap();

        finalizer.finalize(grant.token, None).await.unwrap();
        let err = finalizer.finalize(grant.token, None).await.unwrap_err();
        assert!(matches!(err, ReservationError::HoldNotFound(_)));
    }

    #[tokio::test]
    async fn test_booked_seats_stay_unavailable_after_release() {
        let (inventory, manager, finalizer, show_id) = setup().await;
        let grant = manager.place_hold(show_id, &[9]).await.unwrap();
        finalizer.finalize(grant.token, None).await.unwrap();

        // Late release of a finalized token must not free the seat.
        assert!(!manager.release_hold(grant.token).await.unwrap());
        assert_eq!(inventory.unavailable_seats(show_id).await.unwrap(), vec![9]);
    }

    #[test]
    fn test_booking_reference_format() {
        let reference = booking_reference();
        assert!(reference.starts_with("BMS-"));
        assert!(reference[4..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    /// Memory store whose booking inserts fail like a unique-violation a
    /// set number of times before succeeding.
    struct FlakyBookingStore {
        inner: MemoryStore,
        insert_failures: AtomicUsize,
    }

    impl FlakyBookingStore {
        fn failing(times: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new(),
                insert_failures: AtomicUsize::new(times),
            })
        }
    }

    #[async_trait]
    impl ReservationStore for FlakyBookingStore {
        async fn register_show(&self, show: NewShow) -> Result<Show, ReservationError> {
            self.inner.register_show(show).await
        }

        async fn get_show(&self, show_id: i64) -> Result<Option<Show>, ReservationError> {
            self.inner.get_show(show_id).await
        }

        async fn delete_show(&self, show_id: i64) -> Result<bool, ReservationError> {
            self.inner.delete_show(show_id).await
        }

        async fn try_transition(
            &self,
            show_id: i64,
            seat_ids: &[SeatId],
            expected: SeatExpectation,
            to: SeatState,
        ) -> Result<TransitionOutcome, ReservationError> {
            self.inner.try_transition(show_id, seat_ids, expected, to).await
        }

        async fn snapshot(
            &self,
            show_id: i64,
        ) -> Result<BTreeMap<SeatId, SeatState>, ReservationError> {
            self.inner.snapshot(show_id).await
        }

        async fn insert_hold(&self, hold: &SeatHold) -> Result<(), ReservationError> {
            self.inner.insert_hold(hold).await
        }

        async fn get_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError> {
            self.inner.get_hold(token).await
        }

        async fn claim_hold(
            &self,
            token: Uuid,
            now: DateTime<Utc>,
        ) -> Result<HoldClaim, ReservationError> {
            self.inner.claim_hold(token, now).await
        }

        async fn remove_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError> {
            self.inner.remove_hold(token).await
        }

        async fn claim_expired_holds(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<SeatHold>, ReservationError> {
            self.inner.claim_expired_holds(now).await
        }

        async fn insert_booking(&self, booking: &Booking) -> Result<(), ReservationError> {
            let should_fail = self
                .insert_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(ReservationError::storage(
                    "duplicate key value violates unique constraint \"bookings_booking_reference_key\"",
                ));
            }
            self.inner.insert_booking(booking).await
        }

        async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
            self.inner.get_booking(id).await
        }

        async fn list_bookings(
            &self,
            user_id: Option<i64>,
        ) -> Result<Vec<Booking>, ReservationError> {
            self.inner.list_bookings(user_id).await
        }
    }

    #[tokio::test]
    async fn test_insert_retries_with_fresh_reference() {
        let store = FlakyBookingStore::failing(1);
        let (inventory, manager, finalizer, show_id) = setup_with(store.clone()).await;
        let grant = manager.place_hold(show_id, &[1, 2]).await.unwrap();

        let booking = finalizer.finalize(grant.token, None).await.unwrap();
        assert!(booking.booking_reference.starts_with("BMS-"));
        assert_eq!(store.inner.list_bookings(None).await.unwrap().len(), 1);

        let snapshot = inventory.snapshot(show_id).await.unwrap();
        assert_eq!(
            snapshot[&1],
            SeatState::Booked {
                booking_id: booking.id
            }
        );
    }

    #[tokio::test]
    async fn test_insert_failure_returns_seats_to_hold() {
        let store = FlakyBookingStore::failing(usize::MAX);
        let (inventory, manager, finalizer, show_id) = setup_with(store.clone()).await;
        let grant = manager.place_hold(show_id, &[1, 2]).await.unwrap();

        let err = finalizer.finalize(grant.token, None).await.unwrap_err();
        assert!(matches!(err, ReservationError::Storage(_)));

        // No booking row, and no seat stranded in Booked.
        assert!(store.inner.list_bookings(None).await.unwrap().is_empty());
        let snapshot = inventory.snapshot(show_id).await.unwrap();
        for seat_id in [1, 2] {
            assert_eq!(
                snapshot[&seat_id],
                SeatState::Held {
                    token: grant.token,
                    expires_at: grant.expires_at
                }
            );
        }

        // The restored hold is fully usable again.
        assert!(manager.release_hold(grant.token).await.unwrap());
        manager.place_hold(show_id, &[1, 2]).await.unwrap();
    }
}
