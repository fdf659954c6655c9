use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_shared::{Booking, BookingId, Seat, SeatId, Trip, TripId};

use crate::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for seats, bookings and the read-only trip catalog.
///
/// Methods on the store itself are single atomic statements. Anything that
/// reads and then writes more than one record goes through [`StoreTx`].
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Opens a unit of work. Dropping it without `commit` discards every write.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    /// Locks one seat record if it is available or its lock has lapsed.
    ///
    /// Returns `None` when the predicate did not match.
    async fn lock_seat_if_free(
        &self,
        seat_id: SeatId,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<Seat>>;

    /// Releases the given seats that are `locked` by `holder`; returns the ids released.
    async fn unlock_seats(&self, seat_ids: &[SeatId], holder: &str) -> StoreResult<Vec<SeatId>>;

    /// Makes every seat whose lock lapsed before `now` available again.
    async fn release_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Bookings still awaiting approval or payment whose deadline passed before `now`.
    async fn expired_booking_ids(&self, now: DateTime<Utc>) -> StoreResult<Vec<BookingId>>;

    async fn get_booking(&self, id: BookingId) -> StoreResult<Option<Booking>>;

    async fn get_seats(&self, ids: &[SeatId]) -> StoreResult<Vec<Seat>>;

    async fn get_trip(&self, id: TripId) -> StoreResult<Option<Trip>>;
}

/// A serializable unit of work over seats and bookings.
#[async_trait]
pub trait StoreTx: Send {
    /// Plain read, no row locks.
    async fn seats(&mut self, ids: &[SeatId]) -> StoreResult<Vec<Seat>>;

    /// Reads and row-locks the given seats.
    async fn seats_for_update(&mut self, ids: &[SeatId]) -> StoreResult<Vec<Seat>>;

    /// Reads and row-locks every record on `trip_id` carrying one of `seat_numbers`.
    async fn seat_numbers_for_update(
        &mut self,
        trip_id: TripId,
        seat_numbers: &[String],
    ) -> StoreResult<Vec<Seat>>;

    async fn trip(&mut self, id: TripId) -> StoreResult<Option<Trip>>;

    async fn save_seats(&mut self, seats: &[Seat]) -> StoreResult<()>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn booking_for_update(&mut self, id: BookingId) -> StoreResult<Option<Booking>>;

    async fn save_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
