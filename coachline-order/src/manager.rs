use chrono::Duration;
use coachline_core::clock::Clock;
use coachline_core::repository::BookingStore;
use coachline_core::{segment, BookingError, CoreResult};
use coachline_shared::{
    ApprovalStatus, Booking, BookingId, PaymentMethod, PaymentStatus, Seat, SeatId, Segment,
};
use coachline_store::app_config::BusinessRules;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{settlement, validate_selection};

/// Turns locked seats into bookings and drives provider approval.
pub struct BookingTransactionManager {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    cash_window: Duration,
    transfer_window: Duration,
}

impl BookingTransactionManager {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, rules: &BusinessRules) -> Self {
        Self {
            store,
            clock,
            cash_window: Duration::minutes(rules.cash_approval_minutes),
            transfer_window: Duration::minutes(rules.transfer_payment_minutes),
        }
    }

    fn deadline_window(&self, method: PaymentMethod) -> Duration {
        match method {
            PaymentMethod::Cash => self.cash_window,
            PaymentMethod::BankTransfer => self.transfer_window,
        }
    }

    /// Confirms the caller's locked seats into a booking awaiting approval or payment.
    pub async fn confirm_booking(
        &self,
        seat_ids: &[SeatId],
        user_id: &str,
        origin: &str,
        destination: &str,
        payment_method: PaymentMethod,
    ) -> CoreResult<Booking> {
        validate_selection(seat_ids)?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        // 1. Every seat must still be locked by the caller
        let requested = tx.seats(seat_ids).await?;
        let Some(first) = requested.first() else {
            return Err(BookingError::ExpiredOrInvalidSelection);
        };
        let trip_id = first.trip_id;
        if requested.iter().any(|s| s.trip_id != trip_id) {
            return Err(BookingError::Validation("seats must belong to one trip".to_string()));
        }

        let mut numbers: Vec<String> = requested.iter().map(|s| s.seat_number.clone()).collect();
        numbers.sort();
        numbers.dedup();
        if numbers.len() != requested.len() {
            return Err(BookingError::Validation("one booking cannot hold a seat number twice".to_string()));
        }
        let group = tx.seat_numbers_for_update(trip_id, &numbers).await?;

        let mut seats: Vec<Seat> = group
            .iter()
            .filter(|s| seat_ids.contains(&s.id) && s.is_locked_by(user_id, now))
            .cloned()
            .collect();
        if seats.len() != seat_ids.len() {
            warn!(
                "Confirm by {} rejected: {} of {} seats still locked",
                user_id,
                seats.len(),
                seat_ids.len()
            );
            return Err(BookingError::ExpiredOrInvalidSelection);
        }

        // 2. Price the segment on the shared trip
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
        let price = trip
            .price_for(origin, destination)
            .ok_or_else(|| BookingError::NoPricingForSegment {
                origin: origin.to_string(),
                destination: destination.to_string(),
            })?;

        // The confirmed range may differ from the locked one
        let conflicting: Vec<SeatId> = seats
            .iter()
            .filter(|seat| {
                let occupied = group.iter().filter(|other| {
                    other.seat_number == seat.seat_number
                        && !seat_ids.contains(&other.id)
                        && other.is_occupying(now)
                });
                segment::overlaps(&trip.stop_order, origin, destination, occupied.map(|s| s.segment.as_ref()))
            })
            .map(|s| s.id)
            .collect();
        if !conflicting.is_empty() {
            return Err(BookingError::SeatsUnavailable(conflicting));
        }

        // 3. Total is the per-seat segment price times the seat count
        let total_price = price * seats.len() as i64;

        // 4. Booking deadline depends on who has to act next
        let booking = Booking {
            id: uuid::Uuid::new_v4(),
            user_id: user_id.to_string(),
            provider_id: trip.provider_id.clone(),
            seat_ids: seat_ids.to_vec(),
            segment: Segment::new(origin, destination),
            total_price,
            payment_method,
            approval_status: ApprovalStatus::PendingApproval,
            payment_status: PaymentStatus::Pending,
            payment_info: None,
            expires_at: Some(now + self.deadline_window(payment_method)),
            created_at: now,
            updated_at: now,
        };

        // 5. Seats move to pending_approval with their segment and price
        for seat in &mut seats {
            seat.mark_pending(booking.id, booking.segment.clone(), price);
        }
        tx.save_seats(&seats).await?;
        tx.insert_booking(&booking).await?;

        // 6. Commit
        tx.commit().await?;

        info!(
            "Booking {} confirmed for {} on trip {} ({} seats, {}, total {})",
            booking.id,
            user_id,
            trip_id,
            seats.len(),
            payment_method,
            total_price
        );
        Ok(booking)
    }

    /// Provider approval of a cash booking; its seats become booked.
    pub async fn approve_booking(&self, booking_id: BookingId, provider_id: &str) -> CoreResult<Booking> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if booking.provider_id != provider_id {
            return Err(BookingError::Forbidden(format!(
                "booking {} belongs to another provider",
                booking_id
            )));
        }
        let eligible = booking.approval_status == ApprovalStatus::PendingApproval
            && booking.payment_method == PaymentMethod::Cash
            && booking.payment_status == PaymentStatus::Pending
            && !booking.deadline_passed(now);
        if !eligible {
            return Err(BookingError::NotEligibleForApproval(booking_id));
        }

        booking.approval_status = ApprovalStatus::ConfirmedByProvider;
        booking.expires_at = None;
        booking.touch(now);

        let booked = settlement::book_seats(tx.as_mut(), &booking).await?;
        tx.save_booking(&booking).await?;
        tx.commit().await?;

        info!("Booking {} approved by {} ({} seats booked)", booking_id, provider_id, booked);
        Ok(booking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::World;
    use crate::ReservationCoordinator;
    use coachline_core::ErrorKind;
    use coachline_shared::SeatStatus;

    struct Engine {
        world: World,
        reservations: ReservationCoordinator,
        bookings: BookingTransactionManager,
    }

    async fn engine() -> Engine {
        let world = World::new().await;
        let rules = BusinessRules::default();
        Engine {
            reservations: ReservationCoordinator::new(world.store.clone(), world.clock.clone(), &rules),
            bookings: BookingTransactionManager::new(world.store.clone(), world.clock.clone(), &rules),
            world,
        }
    }

    #[tokio::test]
    async fn test_confirm_prices_every_seat() {
        let e = engine().await;
        let a = e.world.seat("A1").await;
        let b = e.world.seat("A2").await;
        e.reservations
            .lock_multiple_seats(e.world.trip.id, &[a.id, b.id], "user-a", "S1", "S3")
            .await
            .unwrap();

        let booking = e
            .bookings
            .confirm_booking(&[a.id, b.id], "user-a", "S1", "S3", PaymentMethod::Cash)
            .await
            .unwrap();

        let unit = e.world.trip.price_for("S1", "S3").unwrap();
        assert_eq!(booking.total_price, unit * 2);
        assert_eq!(booking.provider_id, "provider-1");
        assert_eq!(booking.expires_at, Some(e.world.clock.now() + Duration::minutes(60)));

        let mut sum = 0;
        for id in [a.id, b.id] {
            let seat = e.world.store.seat(id).await.unwrap();
            assert_eq!(seat.status, SeatStatus::PendingApproval);
            assert_eq!(seat.booking_ref, Some(booking.id));
            assert_eq!(seat.segment, Some(Segment::new("S1", "S3")));
            assert!(seat.lock_expires_at.is_none());
            sum += seat.price.unwrap();
        }
        assert_eq!(sum, booking.total_price);
    }

    #[tokio::test]
    async fn test_bank_transfer_gets_short_deadline() {
        let e = engine().await;
        let seat = e.world.seat("B1").await;
        e.reservations.lock_seat(seat.id, "user-a").await.unwrap();

        let booking = e
            .bookings
            .confirm_booking(&[seat.id], "user-a", "S2", "S4", PaymentMethod::BankTransfer)
            .await
            .unwrap();
        assert_eq!(booking.expires_at, Some(e.world.clock.now() + Duration::minutes(15)));
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_confirm_requires_live_own_locks() {
        let e = engine().await;
        let seat = e.world.seat("C1").await;
        e.reservations.lock_seat(seat.id, "user-a").await.unwrap();

        let err = e
            .bookings
            .confirm_booking(&[seat.id], "user-b", "S1", "S2", PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ExpiredOrInvalidSelection));

        e.world.clock.advance(Duration::minutes(10));
        let err = e
            .bookings
            .confirm_booking(&[seat.id], "user-a", "S1", "S2", PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ExpiredOrInvalidSelection));
    }

    #[tokio::test]
    async fn test_missing_price_rejected_without_changes() {
        let e = engine().await;
        let mut trip = crate::fixtures::trip_at(e.world.clock.now() + Duration::days(1));
        trip.prices.clear();
        e.world.store.insert_trip(trip.clone()).await;
        let seat = Seat::new(trip.id, "D1");
        e.world.store.insert_seat(seat.clone()).await;
        e.reservations.lock_seat(seat.id, "user-a").await.unwrap();

        let err = e
            .bookings
            .confirm_booking(&[seat.id], "user-a", "S1", "S2", PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NoPricingForSegment { .. }));
        assert_eq!(e.world.store.seat(seat.id).await.unwrap().status, SeatStatus::Locked);
    }

    #[tokio::test]
    async fn test_confirm_rechecks_overlap_for_new_range() {
        let e = engine().await;
        let held = e.world.seat("E1").await;
        let sibling = e.world.seat("E1").await;
        e.reservations
            .lock_multiple_seats(e.world.trip.id, &[held.id], "user-a", "S1", "S3")
            .await
            .unwrap();
        e.reservations
            .lock_multiple_seats(e.world.trip.id, &[sibling.id], "user-b", "S3", "S5")
            .await
            .unwrap();

        let err = e
            .bookings
            .confirm_booking(&[sibling.id], "user-b", "S2", "S5", PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert_eq!(err.seat_ids(), &[sibling.id]);
    }

    #[tokio::test]
    async fn test_approve_books_seats_once() {
        let e = engine().await;
        let seat = e.world.seat("F1").await;
        e.reservations.lock_seat(seat.id, "user-a").await.unwrap();
        let booking = e
            .bookings
            .confirm_booking(&[seat.id], "user-a", "S1", "S5", PaymentMethod::Cash)
            .await
            .unwrap();

        let err = e.bookings.approve_booking(booking.id, "provider-2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let approved = e.bookings.approve_booking(booking.id, "provider-1").await.unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::ConfirmedByProvider);
        assert_eq!(approved.payment_status, PaymentStatus::Pending);
        assert!(approved.expires_at.is_none());

        let booked = e.world.store.seat(seat.id).await.unwrap();
        assert_eq!(booked.status, SeatStatus::Booked);
        assert!(booked.access_id.is_some());

        let err = e.bookings.approve_booking(booking.id, "provider-1").await.unwrap_err();
        assert!(matches!(err, BookingError::NotEligibleForApproval(_)));
    }

    #[tokio::test]
    async fn test_bank_transfer_not_approvable() {
        let e = engine().await;
        let seat = e.world.seat("G1").await;
        e.reservations.lock_seat(seat.id, "user-a").await.unwrap();
        let booking = e
            .bookings
            .confirm_booking(&[seat.id], "user-a", "S1", "S2", PaymentMethod::BankTransfer)
            .await
            .unwrap();

        let err = e.bookings.approve_booking(booking.id, "provider-1").await.unwrap_err();
        assert!(matches!(err, BookingError::NotEligibleForApproval(_)));
    }
}
