use tracing::info;

use marquee_reserve::ExpirySweeper;

/// Background loop reclaiming seats from expired holds. Runs until the
/// process exits; sweep failures are logged and retried next tick.
pub async fn start_expiry_sweeper(sweeper: ExpirySweeper) {
    info!("Expiry sweeper started");
    sweeper.run().await;
}
