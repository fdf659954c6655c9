//! In-process store with the same atomicity guarantees as the Postgres one.
//!
//! Every unit of work holds the single state mutex for its whole lifetime and
//! writes to a staged copy, so concurrent callers are fully serialized and an
//! uncommitted transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::repository::{BookingStore, StoreResult, StoreTx};
use coachline_shared::{ApprovalStatus, Booking, BookingId, PaymentStatus, Seat, SeatId, SeatStatus, Trip, TripId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    trips: HashMap<TripId, Trip>,
    seats: HashMap<SeatId, Seat>,
    bookings: HashMap<BookingId, Booking>,
}

impl MemoryState {
    fn seats_in_order(&self, ids: &[SeatId]) -> Vec<Seat> {
        ids.iter().filter_map(|id| self.seats.get(id).cloned()).collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_trip(&self, trip: Trip) {
        self.state.lock().await.trips.insert(trip.id, trip);
    }

    pub async fn insert_seat(&self, seat: Seat) {
        self.state.lock().await.seats.insert(seat.id, seat);
    }

    pub async fn seat(&self, id: SeatId) -> Option<Seat> {
        self.state.lock().await.seats.get(&id).cloned()
    }

    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.state.lock().await.bookings.get(&id).cloned()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn lock_seat_if_free(
        &self,
        seat_id: SeatId,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<Seat>> {
        let mut state = self.state.lock().await;
        match state.seats.get_mut(&seat_id) {
            Some(seat) if seat.is_lockable(now) => {
                seat.lock(holder, expires_at, None);
                Ok(Some(seat.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn unlock_seats(&self, seat_ids: &[SeatId], holder: &str) -> StoreResult<Vec<SeatId>> {
        let mut state = self.state.lock().await;
        let mut released = Vec::new();
        for id in seat_ids {
            if let Some(seat) = state.seats.get_mut(id) {
                if seat.status == SeatStatus::Locked && seat.holder.as_deref() == Some(holder) {
                    seat.release();
                    released.push(*id);
                }
            }
        }
        Ok(released)
    }

    async fn release_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut released = 0;
        for seat in state.seats.values_mut() {
            if seat.status == SeatStatus::Locked && seat.lock_expires_at.map_or(true, |at| at < now) {
                seat.release();
                released += 1;
            }
        }
        Ok(released)
    }

    async fn expired_booking_ids(&self, now: DateTime<Utc>) -> StoreResult<Vec<BookingId>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .filter(|b| {
                b.approval_status == ApprovalStatus::PendingApproval
                    && b.payment_status == PaymentStatus::Pending
                    && b.expires_at.map_or(false, |at| at < now)
            })
            .map(|b| b.id)
            .collect())
    }

    async fn get_booking(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn get_seats(&self, ids: &[SeatId]) -> StoreResult<Vec<Seat>> {
        Ok(self.state.lock().await.seats_in_order(ids))
    }

    async fn get_trip(&self, id: TripId) -> StoreResult<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(&id).cloned())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn seats(&mut self, ids: &[SeatId]) -> StoreResult<Vec<Seat>> {
        Ok(self.staged.seats_in_order(ids))
    }

    async fn seats_for_update(&mut self, ids: &[SeatId]) -> StoreResult<Vec<Seat>> {
        Ok(self.staged.seats_in_order(ids))
    }

    async fn seat_numbers_for_update(
        &mut self,
        trip_id: TripId,
        seat_numbers: &[String],
    ) -> StoreResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self
            .staged
            .seats
            .values()
            .filter(|s| s.trip_id == trip_id && seat_numbers.contains(&s.seat_number))
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.id);
        Ok(seats)
    }

    async fn trip(&mut self, id: TripId) -> StoreResult<Option<Trip>> {
        Ok(self.staged.trips.get(&id).cloned())
    }

    async fn save_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
        for seat in seats {
            self.staged.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking_for_update(&mut self, id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.staged.bookings.get(&id).cloned())
    }

    async fn save_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachline_shared::TripStatus;

    fn trip() -> Trip {
        Trip {
            id: uuid::Uuid::new_v4(),
            provider_id: "provider-1".into(),
            status: TripStatus::Scheduled,
            departure_time: Utc::now(),
            stop_order: vec!["A".into(), "B".into()],
            prices: vec![],
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let trip = trip();
        let seat = Seat::new(trip.id, "A1");
        let seat_id = seat.id;
        store.insert_trip(trip).await;
        store.insert_seat(seat).await;

        {
            let mut tx = store.begin().await.unwrap();
            let mut seats = tx.seats_for_update(&[seat_id]).await.unwrap();
            seats[0].lock("user-a", Utc::now() + chrono::Duration::minutes(10), None);
            tx.save_seats(&seats).await.unwrap();
        }
        assert_eq!(store.seat(seat_id).await.unwrap().status, SeatStatus::Available);

        let mut tx = store.begin().await.unwrap();
        let mut seats = tx.seats_for_update(&[seat_id]).await.unwrap();
        seats[0].lock("user-a", Utc::now() + chrono::Duration::minutes(10), None);
        tx.save_seats(&seats).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.seat(seat_id).await.unwrap().status, SeatStatus::Locked);
    }

    #[tokio::test]
    async fn test_conditional_lock_respects_live_holds() {
        let store = MemoryStore::new();
        let seat = Seat::new(uuid::Uuid::new_v4(), "A1");
        let seat_id = seat.id;
        store.insert_seat(seat).await;

        let now = Utc::now();
        let first = store
            .lock_seat_if_free(seat_id, "user-a", now, now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .lock_seat_if_free(seat_id, "user-b", now, now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert!(second.is_none());

        let later = now + chrono::Duration::minutes(11);
        let reclaimed = store
            .lock_seat_if_free(seat_id, "user-b", later, later + chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(reclaimed.unwrap().holder.as_deref(), Some("user-b"));
    }
}
