pub mod finalize;
pub mod holds;
pub mod inventory;
pub mod memory;
pub mod sweeper;

pub use finalize::BookingFinalizer;
pub use holds::{HoldGrant, HoldManager};
pub use inventory::SeatInventory;
pub use memory::MemoryStore;
pub use sweeper::ExpirySweeper;
