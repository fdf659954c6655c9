use crate::{BookingId, SeatId, TripId};

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SeatsLockedEvent {
    pub trip_id: TripId,
    pub seat_ids: Vec<SeatId>,
    pub user_id: String,
    pub expires_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SeatsUnlockedEvent {
    pub seat_ids: Vec<SeatId>,
    pub user_id: String,
    pub released: u64,
}

/// Emitted on every booking lifecycle transition; `status` names the transition.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingEvent {
    pub booking_id: BookingId,
    pub user_id: String,
    pub provider_id: String,
    pub status: String,
    pub total_price: i64,
    pub timestamp: i64,
}

pub mod topics {
    pub const SEATS_LOCKED: &str = "seats.locked";
    pub const SEATS_UNLOCKED: &str = "seats.unlocked";
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    pub const BOOKING_APPROVED: &str = "booking.approved";
    pub const BOOKING_PAID: &str = "booking.paid";
    pub const BOOKING_PAYMENT_FAILED: &str = "booking.payment_failed";
    pub const BOOKING_REFUNDED: &str = "booking.refunded";
    pub const BOOKING_EXPIRED: &str = "booking.expired";
}

impl BookingEvent {
    pub fn from_booking(booking: &crate::Booking, status: &str, timestamp: i64) -> Self {
        Self {
            booking_id: booking.id,
            user_id: booking.user_id.clone(),
            provider_id: booking.provider_id.clone(),
            status: status.to_string(),
            total_price: booking.total_price,
            timestamp,
        }
    }
}
