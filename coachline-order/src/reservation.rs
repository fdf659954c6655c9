use chrono::Duration;
use coachline_core::clock::Clock;
use coachline_core::repository::BookingStore;
use coachline_core::{segment, BookingError, CoreResult};
use coachline_shared::{Seat, SeatId, Segment, TripId};
use coachline_store::app_config::BusinessRules;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::validate_selection;

/// Grants time-boxed seat holds.
pub struct ReservationCoordinator {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    lock_ttl: Duration,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, rules: &BusinessRules) -> Self {
        Self {
            store,
            clock,
            lock_ttl: Duration::minutes(rules.seat_lock_minutes),
        }
    }

    /// Locks a single seat record without segment information.
    pub async fn lock_seat(&self, seat_id: SeatId, user_id: &str) -> CoreResult<Seat> {
        let now = self.clock.now();

        match self.store.lock_seat_if_free(seat_id, user_id, now, now + self.lock_ttl).await? {
            Some(seat) => {
                info!("Seat {} locked by {} until {:?}", seat_id, user_id, seat.lock_expires_at);
                Ok(seat)
            }
            None => {
                if self.store.get_seats(&[seat_id]).await?.is_empty() {
                    return Err(BookingError::not_found("seat", seat_id));
                }
                warn!("Seat {} unavailable for {}", seat_id, user_id);
                Err(BookingError::SeatUnavailable(seat_id))
            }
        }
    }

    /// Locks every requested seat for `origin -> destination`, or none of them.
    pub async fn lock_multiple_seats(
        &self,
        trip_id: TripId,
        seat_ids: &[SeatId],
        user_id: &str,
        origin: &str,
        destination: &str,
    ) -> CoreResult<Vec<Seat>> {
        validate_selection(seat_ids)?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        // 1. Validate the requested stop range against the route
        let trip = tx
            .trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found("trip", trip_id))?;
        if trip.segment_indices(origin, destination).is_none() {
            return Err(BookingError::InvalidSegment {
                origin: origin.to_string(),
                destination: destination.to_string(),
            });
        }

        // 2. Row-lock the requested seats together with every sibling record
        let requested = tx.seats(seat_ids).await?;
        if let Some(missing) = seat_ids.iter().find(|id| !requested.iter().any(|s| s.id == **id)) {
            return Err(BookingError::not_found("seat", missing));
        }
        if let Some(foreign) = requested.iter().find(|s| s.trip_id != trip_id) {
            return Err(BookingError::Validation(format!("seat {} is not on trip {}", foreign.id, trip_id)));
        }
        let mut numbers: Vec<String> = Vec::new();
        for seat in &requested {
            if numbers.contains(&seat.seat_number) {
                return Err(BookingError::Validation(format!(
                    "seat number {} requested more than once",
                    seat.seat_number
                )));
            }
            numbers.push(seat.seat_number.clone());
        }
        let group = tx.seat_numbers_for_update(trip_id, &numbers).await?;
        let by_id: HashMap<SeatId, &Seat> = group.iter().map(|s| (s.id, s)).collect();

        // 3. Own status first, then segment overlap against occupied siblings
        let mut unavailable = Vec::new();
        for id in seat_ids {
            let Some(seat) = by_id.get(id) else {
                unavailable.push(*id);
                continue;
            };
            if !seat.is_lockable(now) {
                unavailable.push(*id);
                continue;
            }
            let occupied = group.iter().filter(|other| {
                other.id != seat.id
                    && other.seat_number == seat.seat_number
                    && !seat_ids.contains(&other.id)
                    && other.is_occupying(now)
            });
            if segment::overlaps(&trip.stop_order, origin, destination, occupied.map(|s| s.segment.as_ref())) {
                unavailable.push(*id);
            }
        }

        // 4. All or nothing; dropping the transaction discards it
        if !unavailable.is_empty() {
            warn!("Lock of {} seats on trip {} rejected, unavailable: {:?}", seat_ids.len(), trip_id, unavailable);
            return Err(BookingError::SeatsUnavailable(unavailable));
        }

        // 5. Lock them all
        let expires_at = now + self.lock_ttl;
        let segment = Segment::new(origin, destination);
        let mut locked: Vec<Seat> = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            if let Some(seat) = by_id.get(id) {
                let mut seat = (*seat).clone();
                seat.lock(user_id, expires_at, Some(segment.clone()));
                locked.push(seat);
            }
        }
        tx.save_seats(&locked).await?;
        tx.commit().await?;

        info!(
            "Locked {} seats on trip {} for {} ({} -> {}) until {}",
            locked.len(),
            trip_id,
            user_id,
            origin,
            destination,
            expires_at
        );
        Ok(locked)
    }

    /// Releases the caller's own locks; anything else in `seat_ids` is skipped.
    pub async fn unlock_tickets(&self, seat_ids: &[SeatId], user_id: &str) -> CoreResult<Vec<SeatId>> {
        validate_selection(seat_ids)?;

        let released = self.store.unlock_seats(seat_ids, user_id).await?;
        info!("Released {} of {} seats for {}", released.len(), seat_ids.len(), user_id);
        Ok(released)
    }
}
