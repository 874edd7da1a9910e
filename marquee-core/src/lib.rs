pub mod booking;
pub mod error;
pub mod hold;
pub mod repository;
pub mod seat;
pub mod show;

pub use booking::{Booking, BookingStatus};
pub use error::ReservationError;
pub use hold::SeatHold;
pub use repository::{HoldClaim, ReservationStore, TransitionOutcome};
pub use seat::{SeatExpectation, SeatId, SeatState};
pub use show::{NewShow, Show};

pub type ReservationResult<T> = Result<T, ReservationError>;
