pub mod models;
pub mod pii;

pub use models::booking::{ApprovalStatus, Booking, PaymentInfo, PaymentMethod, PaymentStatus};
pub use models::seat::{Seat, SeatStatus, Segment};
pub use models::trip::{SegmentPrice, Trip, TripStatus};

pub type SeatId = uuid::Uuid;
pub type BookingId = uuid::Uuid;
pub type TripId = uuid::Uuid;
pub type StopId = String;
pub type UserId = String;

/// Error returned when a persisted status string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status value: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}
