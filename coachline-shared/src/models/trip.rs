use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status_strings;
use crate::{StopId, TripId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

status_strings!(TripStatus {
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// One cell of a trip's price matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentPrice {
    pub origin_stop: StopId,
    pub destination_stop: StopId,
    pub price: i64,
}

/// Read-only view of a scheduled trip, owned by the scheduling subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub provider_id: String,
    pub status: TripStatus,
    pub departure_time: DateTime<Utc>,
    /// Stops in travel order; a stop's position is its stop order index.
    pub stop_order: Vec<StopId>,
    pub prices: Vec<SegmentPrice>,
}

impl Trip {
    pub fn stop_index(&self, stop: &str) -> Option<usize> {
        self.stop_order.iter().position(|s| s == stop)
    }

    /// Resolves a forward sub-range of the route to `(origin_index, destination_index)`.
    ///
    /// Returns `None` when either stop is not on the route or the range does
    /// not move forward.
    pub fn segment_indices(&self, origin: &str, destination: &str) -> Option<(usize, usize)> {
        let from = self.stop_index(origin)?;
        let to = self.stop_index(destination)?;
        (from < to).then_some((from, to))
    }

    pub fn price_for(&self, origin: &str, destination: &str) -> Option<i64> {
        self.prices
            .iter()
            .find(|p| p.origin_stop == origin && p.destination_stop == destination)
            .map(|p| p.price)
    }
}
