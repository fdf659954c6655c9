pub mod manager;
pub mod reaper;
pub mod reservation;
pub mod settlement;

pub use manager::BookingTransactionManager;
pub use reaper::{ExpiryReaper, ReaperHandle};
pub use reservation::ReservationCoordinator;

use coachline_core::BookingError;
use coachline_shared::SeatId;
use std::collections::HashSet;

/// Rejects empty selections and repeated seat ids before any state is touched.
pub(crate) fn validate_selection(seat_ids: &[SeatId]) -> Result<(), BookingError> {
    if seat_ids.is_empty() {
        return Err(BookingError::Validation("at least one seat is required".to_string()));
    }
    let mut seen = HashSet::with_capacity(seat_ids.len());
    if let Some(dup) = seat_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(BookingError::Validation(format!("seat {} requested more than once", dup)));
    }
    Ok(())
}
