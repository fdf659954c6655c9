use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status_strings;
use crate::{BookingId, SeatId, StopId, TripId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Locked,
    PendingApproval,
    Booked,
}

status_strings!(SeatStatus {
    Available => "available",
    Locked => "locked",
    PendingApproval => "pending_approval",
    Booked => "booked",
});

/// The stop range a ticket actually covers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub origin_stop: StopId,
    pub destination_stop: StopId,
}

impl Segment {
    pub fn new(origin_stop: impl Into<StopId>, destination_stop: impl Into<StopId>) -> Self {
        Self {
            origin_stop: origin_stop.into(),
            destination_stop: destination_stop.into(),
        }
    }
}

/// A sellable seat record on one trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub trip_id: TripId,
    pub seat_number: String,
    pub status: SeatStatus,
    pub holder: Option<UserId>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub segment: Option<Segment>,
    pub price: Option<i64>,
    pub booking_ref: Option<BookingId>,
    pub access_id: Option<String>,
}

impl Seat {
    pub fn new(trip_id: TripId, seat_number: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            trip_id,
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            holder: None,
            lock_expires_at: None,
            segment: None,
            price: None,
            booking_ref: None,
            access_id: None,
        }
    }

    /// A lock whose deadline has passed, or that never carried one, is reclaimable.
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Locked && self.lock_expires_at.map_or(true, |at| at <= now)
    }

    /// True when anyone may lock this record right now.
    pub fn is_lockable(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Available || self.lock_expired(now)
    }

    /// True when this record currently claims its physical seat.
    pub fn is_occupying(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SeatStatus::Available => false,
            SeatStatus::Locked => !self.lock_expired(now),
            SeatStatus::PendingApproval | SeatStatus::Booked => true,
        }
    }

    pub fn is_locked_by(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Locked
            && !self.lock_expired(now)
            && self.holder.as_deref() == Some(user_id)
    }

    pub fn lock(&mut self, holder: &str, expires_at: DateTime<Utc>, segment: Option<Segment>) {
        self.status = SeatStatus::Locked;
        self.holder = Some(holder.to_string());
        self.lock_expires_at = Some(expires_at);
        self.segment = segment;
        self.price = None;
        self.booking_ref = None;
    }

    pub fn mark_pending(&mut self, booking_id: BookingId, segment: Segment, price: i64) {
        self.status = SeatStatus::PendingApproval;
        self.booking_ref = Some(booking_id);
        self.segment = Some(segment);
        self.price = Some(price);
        self.lock_expires_at = None;
    }

    /// Moves a pending record to booked; the boarding code is only assigned once.
    pub fn mark_booked(&mut self, access_id: impl FnOnce() -> String) {
        self.status = SeatStatus::Booked;
        self.lock_expires_at = None;
        if self.access_id.is_none() {
            self.access_id = Some(access_id());
        }
    }

    pub fn release(&mut self) {
        self.status = SeatStatus::Available;
        self.holder = None;
        self.lock_expires_at = None;
        self.segment = None;
        self.price = None;
        self.booking_ref = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expired_lock_is_lockable() {
        let now = Utc::now();
        let mut seat = Seat::new(uuid::Uuid::new_v4(), "A1");
        assert!(seat.is_lockable(now));

        seat.lock("user-a", now + Duration::minutes(10), None);
        assert!(!seat.is_lockable(now));
        assert!(seat.is_occupying(now));
        assert!(seat.is_locked_by("user-a", now));
        assert!(!seat.is_locked_by("user-b", now));

        let later = now + Duration::minutes(11);
        assert!(seat.is_lockable(later));
        assert!(!seat.is_occupying(later));
        assert!(!seat.is_locked_by("user-a", later));
    }

    #[test]
    fn test_access_id_assigned_once() {
        let mut seat = Seat::new(uuid::Uuid::new_v4(), "A1");
        seat.mark_pending(uuid::Uuid::new_v4(), Segment::new("A", "B"), 100);
        seat.mark_booked(|| "FIRST001".to_string());
        seat.release();
        seat.mark_pending(uuid::Uuid::new_v4(), Segment::new("A", "B"), 100);
        seat.mark_booked(|| "SECOND02".to_string());
        assert_eq!(seat.access_id.as_deref(), Some("FIRST001"));
    }

    #[test]
    fn test_release_clears_claim() {
        let mut seat = Seat::new(uuid::Uuid::new_v4(), "B2");
        seat.mark_pending(uuid::Uuid::new_v4(), Segment::new("A", "B"), 100);
        seat.release();
        assert_eq!(seat.status, SeatStatus::Available);
        assert!(seat.booking_ref.is_none());
        assert!(seat.segment.is_none());
        assert!(seat.price.is_none());
    }
}
