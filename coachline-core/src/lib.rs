pub mod clock;
pub mod events;
pub mod repository;
pub mod segment;

use coachline_shared::{BookingId, SeatId};
use serde::Serialize;

/// Coarse classification callers use to decide between retrying, fixing the
/// request, or giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    ExternalGateway,
    Transient,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization failure or deadlock; the whole operation may be retried.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid segment {origin} -> {destination}")]
    InvalidSegment { origin: String, destination: String },
    #[error("Seat {0} is unavailable")]
    SeatUnavailable(SeatId),
    #[error("Seats unavailable: {0:?}")]
    SeatsUnavailable(Vec<SeatId>),
    #[error("Seat selection expired or invalid")]
    ExpiredOrInvalidSelection,
    #[error("No pricing for segment {origin} -> {destination}")]
    NoPricingForSegment { origin: String, destination: String },
    #[error("Booking {0} is not eligible for approval")]
    NotEligibleForApproval(BookingId),
    #[error("Payment for booking {0} is not pending")]
    PaymentNotPending(BookingId),
    #[error("Booking {id} is not refundable: {reason}")]
    NotRefundable { id: BookingId, reason: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    /// The gateway answered and refused this one request.
    #[error("Payment gateway declined: {code} {message}")]
    GatewayDeclined { code: String, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) | BookingError::InvalidSegment { .. } => ErrorKind::Validation,
            BookingError::SeatUnavailable(_)
            | BookingError::SeatsUnavailable(_)
            | BookingError::ExpiredOrInvalidSelection
            | BookingError::NoPricingForSegment { .. }
            | BookingError::NotEligibleForApproval(_)
            | BookingError::PaymentNotPending(_)
            | BookingError::NotRefundable { .. }
            | BookingError::GatewayDeclined { .. } => ErrorKind::Conflict,
            BookingError::NotFound(_) => ErrorKind::NotFound,
            BookingError::Forbidden(_) => ErrorKind::Forbidden,
            BookingError::Gateway(_) => ErrorKind::ExternalGateway,
            BookingError::Store(StoreError::Conflict(_)) => ErrorKind::Transient,
            BookingError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Seats the caller should deselect before retrying.
    pub fn seat_ids(&self) -> &[SeatId] {
        match self {
            BookingError::SeatsUnavailable(ids) => ids,
            BookingError::SeatUnavailable(id) => std::slice::from_ref(id),
            _ => &[],
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        BookingError::NotFound(format!("{} {}", what, id))
    }
}

pub type CoreResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_is_transient() {
        let err: BookingError = StoreError::Conflict("40001".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err: BookingError = StoreError::Database("connection reset".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_unavailable_seats_are_reported() {
        let ids = vec![uuid::Uuid::new_v4(), uuid::Uuid::new_v4()];
        let err = BookingError::SeatsUnavailable(ids.clone());
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.seat_ids(), ids.as_slice());
        assert!(BookingError::Validation("bad".into()).seat_ids().is_empty());
    }

    #[test]
    fn test_gateway_decline_is_not_an_outage() {
        let declined = BookingError::GatewayDeclined {
            code: "94".into(),
            message: "duplicate request".into(),
        };
        assert_eq!(declined.kind(), ErrorKind::Conflict);
        assert_eq!(BookingError::Gateway("timed out".into()).kind(), ErrorKind::ExternalGateway);
    }
}
