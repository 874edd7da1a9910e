use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use marquee_core::{
    ReservationError, ReservationStore, SeatExpectation, SeatHold, SeatId, SeatState,
    TransitionOutcome,
};

use crate::inventory::SeatInventory;

/// A successfully placed hold, as returned to the seat-selection client.
#[derive(Debug, Clone, Serialize)]
pub struct HoldGrant {
    pub token: Uuid,
    pub show_id: i64,
    pub held: Vec<SeatId>,
    pub unavailable: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

/// Hold Manager: issues time-limited holds during seat selection, enforcing
/// at-most-one-holder-per-seat through the inventory's compare-and-set.
#[derive(Clone)]
pub struct HoldManager {
    inventory: SeatInventory,
    ttl: chrono::Duration,
}

impl HoldManager {
    pub fn new(inventory: SeatInventory, ttl: chrono::Duration) -> Self {
        Self { inventory, ttl }
    }

    /// Place a hold on the requested seats with the manager's default TTL.
    pub async fn place_hold(
        &self,
        show_id: i64,
        requested: &[i64],
    ) -> Result<HoldGrant, ReservationError> {
        self.place_hold_with_ttl(show_id, requested, self.ttl).await
    }

    /// Place a hold with an explicit TTL. Either every requested seat is
    /// marked held under a fresh token, or none is and the unavailable
    /// seats are reported.
    pub async fn place_hold_with_ttl(
        &self,
        show_id: i64,
        requested: &[i64],
        ttl: chrono::Duration,
    ) -> Result<HoldGrant, ReservationError> {
        let show = self.inventory.show(show_id).await?;
        let seats = SeatInventory::validate_selection(&show, requested)?;

        let hold = SeatHold::new(show_id, seats.clone(), ttl);
        let store = self.inventory.store();

        // Record before seats: a crash mid-placement then leaves a record
        // the sweeper can reclaim, never unrecoverable Held seats.
        store.insert_hold(&hold).await?;

        let outcome = self
            .inventory
            .transition(
                show_id,
                &seats,
                SeatExpectation::Free,
                SeatState::Held {
                    token: hold.token,
                    expires_at: hold.expires_at,
                },
            )
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = store.remove_hold(hold.token).await;
                return Err(err);
            }
        };
        if let TransitionOutcome::Conflict { seat_ids } = outcome {
            let _ = store.remove_hold(hold.token).await;
            return Err(ReservationError::SeatsUnavailable { seat_ids });
        }

        info!(
            "Hold {} placed on show {} seats {:?}, expires {}",
            hold.token, show_id, seats, hold.expires_at
        );
        Ok(HoldGrant {
            token: hold.token,
            show_id,
            held: seats,
            unavailable: Vec::new(),
            expires_at: hold.expires_at,
        })
    }

    /// Return a hold's seats to Free. Idempotent: releasing an unknown,
    /// already-released, or already-finalized token is a no-op.
    pub async fn release_hold(&self, token: Uuid) -> Result<bool, ReservationError> {
        let Some(hold) = self.inventory.store().remove_hold(token).await? else {
            return Ok(false);
        };
        release_hold_seats(&self.inventory, &hold).await;
        info!("Hold {} released on show {}", token, hold.show_id);
        Ok(true)
    }
}

/// Free every seat still held under this hold's token. Seats the token no
/// longer covers are skipped seat-by-seat rather than failing the batch.
pub(crate) async fn release_hold_seats(inventory: &SeatInventory, hold: &SeatHold) {
    let expected = SeatExpectation::HeldBy(hold.token);
    match inventory
        .transition(hold.show_id, &hold.seat_ids, expected, SeatState::Free)
        .await
    {
        Ok(TransitionOutcome::Applied) => {}
        Ok(TransitionOutcome::Conflict { seat_ids }) => {
            warn!(
                "Hold {} release found foreign seat states {:?}, freeing the rest individually",
                hold.token, seat_ids
            );
            for seat_id in &hold.seat_ids {
                let _ = inventory
                    .transition(hold.show_id, &[*seat_id], expected, SeatState::Free)
                    .await;
            }
        }
        Err(err) => {
            warn!("Failed to free seats of hold {}: {}", hold.token, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;

    async fn setup(total_seats: u32) -> (SeatInventory, HoldManager, i64) {
        let inventory = SeatInventory::new(Arc::new(MemoryStore::new()));
        let show = inventory
            .register_show(marquee_core::NewShow {
                movie_id: 1,
                screen_id: 1,
                show_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                show_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
                base_price: 250.0,
                total_seats,
            })
            .await
            .unwrap();
        let manager = HoldManager::new(inventory.clone(), chrono::Duration::minutes(3));
        (inventory, manager, show.id)
    }

    #[tokio::test]
    async fn test_place_hold_marks_seats_held() {
        let (inventory, manager, show_id) = setup(100).await;

        let grant = manager.place_hold(show_id, &[1, 2, 3]).await.unwrap();
        assert_eq!(grant.held, vec![1, 2, 3]);
        assert!(grant.unavailable.is_empty());

        assert_eq!(
            inventory.unavailable_seats(show_id).await.unwrap(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_duplicate_request_seats_deduped() {
        let (_, manager, show_id) = setup(100).await;
        let grant = manager.place_hold(show_id, &[2, 2, 1]).await.unwrap();
        assert_eq!(grant.held, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_overlapping_hold_reports_exact_seats() {
        let (_, manager, show_id) = setup(100).await;
        manager.place_hold(show_id, &[2, 3]).await.unwrap();

        let err = manager.place_hold(show_id, &[1, 2, 3]).await.unwrap_err();
        match err {
            ReservationError::SeatsUnavailable { seat_ids } => {
                assert_eq!(seat_ids, vec![2, 3]);
            }
            other => panic!("expected SeatsUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_release_returns_seats_to_free() {
        let (inventory, manager, show_id) = setup(100).await;
        let grant = manager.place_hold(show_id, &[7, 8]).await.unwrap();

        assert!(manager.release_hold(grant.token).await.unwrap());
        assert!(inventory.unavailable_seats(show_id).await.unwrap().is_empty());

        // Released seats can be held again.
        manager.place_hold(show_id, &[7, 8]).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (_, manager, show_id) = setup(100).await;
        let grant = manager.place_hold(show_id, &[7]).await.unwrap();

        assert!(manager.release_hold(grant.token).await.unwrap());
        assert!(!manager.release_hold(grant.token).await.unwrap());
        assert!(!manager.release_hold(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_losing_hold_leaves_no_record() {
        let (inventory, manager, show_id) = setup(100).await;
        let grant = manager.place_hold(show_id, &[2, 3]).await.unwrap();

        let err = manager.place_hold(show_id, &[1, 2]).await.unwrap_err();
        assert!(matches!(err, ReservationError::SeatsUnavailable { .. }));

        // Only the winner's record survives the failed attempt.
        assert!(inventory.store().get_hold(grant.token).await.unwrap().is_some());
        let remaining = inventory
            .store()
            .claim_expired_holds(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, grant.token);
    }

    #[tokio::test]
    async fn test_unknown_show_rejected() {
        let (_, manager, _) = setup(100).await;
        let err = manager.place_hold(999, &[1]).await.unwrap_err();
        assert!(matches!(err, ReservationError::ShowNotFound(999)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_holds_all_succeed() {
        let (_, manager, show_id) = setup(100).await;

        let mut tasks = Vec::new();
        for i in 0..10i64 {
            let manager = manager.clone();
            let seats = vec![i * 3 + 1, i * 3 + 2, i * 3 + 3];
            tasks.push(tokio::spawn(async move {
                manager.place_hold(show_id, &seats).await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overlapping_holds_single_winner() {
        let (_, manager, show_id) = setup(100).await;

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.place_hold(show_id, &[1, 2, 3]).await })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.place_hold(show_id, &[1, 2, 3]).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one overlapping hold may win");

        let loser = results.into_iter().find(|r| r.is_err()).unwrap();
        match loser.unwrap_err() {
            ReservationError::SeatsUnavailable { seat_ids } => {
                assert_eq!(seat_ids, vec![1, 2, 3]);
            }
            other => panic!("expected SeatsUnavailable, got {other:?}"),
        }
    }
}
