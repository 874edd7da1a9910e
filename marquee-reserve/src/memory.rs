use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use marquee_core::{
    Booking, HoldClaim, NewShow, ReservationError, ReservationStore, SeatExpectation, SeatHold,
    SeatId, SeatState, Show, TransitionOutcome,
};

/// In-memory reservation store for tests and single-node runs. Seat state is
/// partitioned per show; a transition locks only the affected show's seats,
/// so requests against different shows never serialize against each other.
pub struct MemoryStore {
    shows: RwLock<HashMap<i64, Arc<ShowPartition>>>,
    next_show_id: AtomicI64,
    holds: Mutex<HashMap<Uuid, SeatHold>>,
    bookings: Mutex<Vec<Booking>>,
}

struct ShowPartition {
    show: Show,
    seats: Mutex<HashMap<SeatId, SeatState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shows: RwLock::new(HashMap::new()),
            next_show_id: AtomicI64::new(1),
            holds: Mutex::new(HashMap::new()),
            bookings: Mutex::new(Vec::new()),
        }
    }

    fn partition(&self, show_id: i64) -> Result<Option<Arc<ShowPartition>>, ReservationError> {
        let shows = self.shows.read().map_err(ReservationError::storage)?;
        Ok(shows.get(&show_id).cloned())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn register_show(&self, new: NewShow) -> Result<Show, ReservationError> {
        let mut shows = self.shows.write().map_err(ReservationError::storage)?;

        let duplicate = shows.values().any(|p| {
            p.show.screen_id == new.screen_id
                && p.show.show_date == new.show_date
                && p.show.show_time == new.show_time
        });
        if duplicate {
            return Err(ReservationError::DuplicateShow {
                screen_id: new.screen_id,
                show_date: new.show_date,
                show_time: new.show_time,
            });
        }

        let show = Show {
            id: self.next_show_id.fetch_add(1, Ordering::SeqCst),
            movie_id: new.movie_id,
            screen_id: new.screen_id,
            show_date: new.show_date,
            show_time: new.show_time,
            base_price: new.base_price,
            total_seats: new.total_seats,
            created_at: Utc::now(),
        };

        let seats = (1..=new.total_seats)
            .map(|seat_id| (seat_id, SeatState::Free))
            .collect();
        shows.insert(
            show.id,
            Arc::new(ShowPartition {
                show: show.clone(),
                seats: Mutex::new(seats),
            }),
        );

        Ok(show)
    }

    async fn get_show(&self, show_id: i64) -> Result<Option<Show>, ReservationError> {
        Ok(self.partition(show_id)?.map(|p| p.show.clone()))
    }

    async fn delete_show(&self, show_id: i64) -> Result<bool, ReservationError> {
        let mut shows = self.shows.write().map_err(ReservationError::storage)?;
        Ok(shows.remove(&show_id).is_some())
    }

    async fn try_transition(
        &self,
        show_id: i64,
        seat_ids: &[SeatId],
        expected: SeatExpectation,
        to: SeatState,
    ) -> Result<TransitionOutcome, ReservationError> {
        let partition = self
            .partition(show_id)?
            .ok_or(ReservationError::ShowNotFound(show_id))?;
        let mut seats = partition.seats.lock().map_err(ReservationError::storage)?;

        // Check the whole set before touching anything.
        let mut conflicts: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|seat_id| match seats.get(seat_id) {
                Some(state) => !expected.matches(state),
                None => true,
            })
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            return Ok(TransitionOutcome::Conflict {
                seat_ids: conflicts,
            });
        }

        for seat_id in seat_ids {
            seats.insert(*seat_id, to.clone());
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn snapshot(
        &self,
        show_id: i64,
    ) -> Result<BTreeMap<SeatId, SeatState>, ReservationError> {
        let partition = self
            .partition(show_id)?
            .ok_or(ReservationError::ShowNotFound(show_id))?;
        let seats = partition.seats.lock().map_err(ReservationError::storage)?;
        Ok(seats.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    async fn insert_hold(&self, hold: &SeatHold) -> Result<(), ReservationError> {
        let mut holds = self.holds.lock().map_err(ReservationError::storage)?;
        holds.insert(hold.token, hold.clone());
        Ok(())
    }

    async fn get_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError> {
        let holds = self.holds.lock().map_err(ReservationError::storage)?;
        Ok(holds.get(&token).cloned())
    }

    async fn claim_hold(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<HoldClaim, ReservationError> {
        let mut holds = self.holds.lock().map_err(ReservationError::storage)?;
        let expired = match holds.get(&token) {
            None => return Ok(HoldClaim::NotFound),
            Some(hold) => hold.is_expired(now),
        };
        // Expired holds stay in place; the sweeper reclaims them.
        if expired {
            return Ok(HoldClaim::Expired);
        }
        let hold = holds
            .remove(&token)
            .ok_or_else(|| ReservationError::storage("hold vanished under lock"))?;
        Ok(HoldClaim::Claimed(hold))
    }

    async fn remove_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError> {
        let mut holds = self.holds.lock().map_err(ReservationError::storage)?;
        Ok(holds.remove(&token))
    }

    async fn claim_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeatHold>, ReservationError> {
        let mut holds = self.holds.lock().map_err(ReservationError::storage)?;
        let expired: Vec<Uuid> = holds
            .values()
            .filter(|hold| hold.is_expired(now))
            .map(|hold| hold.token)
            .collect();
        Ok(expired.iter().filter_map(|token| holds.remove(token)).collect())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), ReservationError> {
        let mut bookings = self.bookings.lock().map_err(ReservationError::storage)?;
        if bookings
            .iter()
            .any(|b| b.booking_reference == booking.booking_reference)
        {
            return Err(ReservationError::storage(format!(
                "duplicate booking reference {}",
                booking.booking_reference
            )));
        }
        bookings.push(booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
        let bookings = self.bookings.lock().map_err(ReservationError::storage)?;
        Ok(bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn list_bookings(
        &self,
        user_id: Option<i64>,
    ) -> Result<Vec<Booking>, ReservationError> {
        let bookings = self.bookings.lock().map_err(ReservationError::storage)?;
        Ok(bookings
            .iter()
            .filter(|b| user_id.is_none() || b.user_id == user_id)
            .cloned()
            .collect())
    }
}
