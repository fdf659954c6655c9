//! Seat transitions driven by a booking's outcome.
//!
//! Both helpers run inside the caller's unit of work and only touch records
//! that still reference the booking, so a seat re-sold in the meantime is
//! never clobbered.

use coachline_core::repository::{StoreResult, StoreTx};
use coachline_shared::{Booking, SeatStatus};
use rand::distributions::Alphanumeric;
use rand::Rng;

const ACCESS_ID_LEN: usize = 8;

/// Short boarding code shown on the ticket.
pub fn generate_access_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_ID_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// `pending_approval -> booked` for every seat still held by `booking`.
pub async fn book_seats(tx: &mut dyn StoreTx, booking: &Booking) -> StoreResult<usize> {
    let mut seats = tx.seats_for_update(&booking.seat_ids).await?;
    seats.retain(|s| s.booking_ref == Some(booking.id) && s.status == SeatStatus::PendingApproval);

    for seat in &mut seats {
        seat.mark_booked(generate_access_id);
    }
    tx.save_seats(&seats).await?;
    Ok(seats.len())
}

/// Returns every seat still referencing `booking` to `available`.
pub async fn release_seats(tx: &mut dyn StoreTx, booking: &Booking) -> StoreResult<usize> {
    let mut seats = tx.seats_for_update(&booking.seat_ids).await?;
    seats.retain(|s| s.booking_ref == Some(booking.id));

    for seat in &mut seats {
        seat.release();
    }
    tx.save_seats(&seats).await?;
    Ok(seats.len())
}
