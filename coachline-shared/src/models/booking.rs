use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status_strings;
use crate::{BookingId, SeatId, Segment, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
}

status_strings!(PaymentMethod {
    Cash => "cash",
    BankTransfer => "bank_transfer",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    PendingApproval,
    ConfirmedByProvider,
    Cancelled,
}

status_strings!(ApprovalStatus {
    PendingApproval => "pending_approval",
    ConfirmedByProvider => "confirmed_by_provider",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

status_strings!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Expired => "expired",
});

impl PaymentStatus {
    /// Gateway callbacks are ignored once a booking reaches one of these.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentInfo {
    pub transaction_date: DateTime<Utc>,
    pub amount: i64,
    pub transaction_id: Option<String>,
}

/// The durable record created when a customer confirms locked seats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub provider_id: String,
    pub seat_ids: Vec<SeatId>,
    pub segment: Segment,
    pub total_price: i64,
    pub payment_method: PaymentMethod,
    pub approval_status: ApprovalStatus,
    pub payment_status: PaymentStatus,
    pub payment_info: Option<PaymentInfo>,
    /// Approval deadline for cash, payment deadline for bank transfer.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Cancelled, failed and expired bookings no longer own their seats.
    pub fn is_active(&self) -> bool {
        self.approval_status != ApprovalStatus::Cancelled
            && !matches!(self.payment_status, PaymentStatus::Failed | PaymentStatus::Expired)
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
