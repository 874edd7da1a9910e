use std::sync::Arc;

use marquee_core::ReservationStore;
use marquee_reserve::{BookingFinalizer, HoldManager, SeatInventory};
use marquee_store::app_config::BusinessRules;
use marquee_store::RedisClient;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReservationStore>,
    pub inventory: SeatInventory,
    pub holds: HoldManager,
    pub finalizer: BookingFinalizer,
    pub redis: Arc<RedisClient>,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        redis: Arc<RedisClient>,
        business_rules: BusinessRules,
    ) -> Self {
        let inventory = SeatInventory::new(store.clone());
        let ttl = chrono::Duration::seconds(business_rules.seat_hold_seconds as i64);
        Self {
            store,
            holds: HoldManager::new(inventory.clone(), ttl),
            finalizer: BookingFinalizer::new(inventory.clone()),
            inventory,
            redis,
            business_rules,
        }
    }
}
