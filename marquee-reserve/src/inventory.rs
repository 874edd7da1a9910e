use std::collections::BTreeMap;
use std::sync::Arc;

use marquee_core::{
    NewShow, ReservationError, ReservationStore, SeatExpectation, SeatId, SeatState, Show,
    TransitionOutcome,
};

/// Seat Inventory: the sole owner of seat-state transitions for a show.
/// Every mutation funnels through `transition`, which delegates to the
/// store's atomic compare-and-set over the whole seat set.
#[derive(Clone)]
pub struct SeatInventory {
    store: Arc<dyn ReservationStore>,
}

impl SeatInventory {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    pub async fn register_show(&self, new: NewShow) -> Result<Show, ReservationError> {
        let show = self.store.register_show(new).await?;
        tracing::info!(
            "Registered show {} (screen {}, {} seats)",
            show.id,
            show.screen_id,
            show.total_seats
        );
        Ok(show)
    }

    pub async fn show(&self, show_id: i64) -> Result<Show, ReservationError> {
        self.store
            .get_show(show_id)
            .await?
            .ok_or(ReservationError::ShowNotFound(show_id))
    }

    pub async fn delete_show(&self, show_id: i64) -> Result<(), ReservationError> {
        if !self.store.delete_show(show_id).await? {
            return Err(ReservationError::ShowNotFound(show_id));
        }
        Ok(())
    }

    /// Atomic multi-seat compare-and-set. A storage-transaction failure is
    /// retried once before the error surfaces.
    pub async fn transition(
        &self,
        show_id: i64,
        seat_ids: &[SeatId],
        expected: SeatExpectation,
        to: SeatState,
    ) -> Result<TransitionOutcome, ReservationError> {
        match self
            .store
            .try_transition(show_id, seat_ids, expected, to.clone())
            .await
        {
            Err(ReservationError::Storage(first)) => {
                tracing::warn!("Seat transition failed, retrying once: {}", first);
                self.store
                    .try_transition(show_id, seat_ids, expected, to)
                    .await
            }
            other => other,
        }
    }

    pub async fn snapshot(
        &self,
        show_id: i64,
    ) -> Result<BTreeMap<SeatId, SeatState>, ReservationError> {
        self.store.snapshot(show_id).await
    }

    /// Sorted, de-duplicated ids of every seat that is held or booked.
    pub async fn unavailable_seats(&self, show_id: i64) -> Result<Vec<SeatId>, ReservationError> {
        let snapshot = self.snapshot(show_id).await?;
        Ok(snapshot
            .into_iter()
            .filter(|(_, state)| !state.is_free())
            .map(|(seat_id, _)| seat_id)
            .collect())
    }

    /// De-duplicates a seat selection and rejects empty, non-positive, or
    /// out-of-layout requests.
    pub fn validate_selection(
        show: &Show,
        requested: &[i64],
    ) -> Result<Vec<SeatId>, ReservationError> {
        if requested.is_empty() {
            return Err(ReservationError::InvalidSeatSelection);
        }

        let mut seats: Vec<SeatId> = Vec::with_capacity(requested.len());
        for &raw in requested {
            if raw <= 0 {
                return Err(ReservationError::InvalidSeatSelection);
            }
            let seat_id = SeatId::try_from(raw)
                .map_err(|_| ReservationError::InvalidSeatSelection)?;
            if !show.contains_seat(seat_id) {
                return Err(ReservationError::InvalidSeatSelection);
            }
            seats.push(seat_id);
        }

        seats.sort_unstable();
        seats.dedup();
        Ok(seats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn show(total_seats: u32) -> Show {
        Show {
            id: 1,
            movie_id: 1,
            screen_id: 1,
            show_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            show_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            base_price: 250.0,
            total_seats,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_selection_dedupes_and_sorts() {
        let seats = SeatInventory::validate_selection(&show(100), &[3, 1, 3, 2, 1]).unwrap();
        assert_eq!(seats, vec![1, 2, 3]);
    }

    #[test]
    fn test_selection_rejects_empty() {
        let err = SeatInventory::validate_selection(&show(100), &[]).unwrap_err();
        assert!(matches!(err, ReservationError::InvalidSeatSelection));
    }

    #[test]
    fn test_selection_rejects_non_positive() {
        for bad in [vec![0], vec![-1], vec![1, 0, 2]] {
            let err = SeatInventory::validate_selection(&show(100), &bad).unwrap_err();
            assert!(matches!(err, ReservationError::InvalidSeatSelection));
        }
    }

    #[test]
    fn test_selection_rejects_out_of_layout() {
        let err = SeatInventory::validate_selection(&show(10), &[1, 11]).unwrap_err();
        assert!(matches!(err, ReservationError::InvalidSeatSelection));
    }
}
