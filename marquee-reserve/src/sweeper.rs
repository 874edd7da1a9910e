use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info};

use marquee_core::{ReservationError, ReservationStore};

use crate::holds::release_hold_seats;
use crate::inventory::SeatInventory;

/// Expiry Sweeper: reclaims seats whose holds lapsed without being
/// finalized. Claiming goes through the same removal CAS as finalize, so a
/// late finalize and a sweep can never both win the same hold.
#[derive(Clone)]
pub struct ExpirySweeper {
    inventory: SeatInventory,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(inventory: SeatInventory, interval: Duration) -> Self {
        Self { inventory, interval }
    }

    /// Claim every hold past its expiry and return its seats to Free.
    /// Returns the number of holds reclaimed.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, ReservationError> {
        let expired = self.inventory.store().claim_expired_holds(now).await?;
        for hold in &expired {
            release_hold_seats(&self.inventory, hold).await;
        }
        Ok(expired.len())
    }

    /// Recurring sweep loop for the background task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(0) => {}
                Ok(reclaimed) => info!("Sweeper reclaimed {} expired holds", reclaimed),
                Err(err) => error!("Sweep failed: {}", err),
            }
        }
    }
}
