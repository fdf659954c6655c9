pub mod refund;
pub mod service;
pub mod signing;
pub mod vnpay;

pub use refund::{HttpRefundClient, RefundClient};
pub use service::{IpnResponse, PaymentService, PaymentStatusView, RefundCheck, ReturnOutcome};

use coachline_core::BookingError;

/// Transport and signing failures talking to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway returned HTTP {0}")]
    HttpStatus(u16),

    #[error("gateway rejected refund: {code} {message}")]
    Rejected { code: String, message: String },

    #[error("invalid signing key")]
    InvalidKey,
}

impl From<GatewayError> for BookingError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Rejected { code, message } => BookingError::GatewayDeclined { code, message },
            other => BookingError::Gateway(other.to_string()),
        }
    }
}
