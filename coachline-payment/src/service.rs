//! The bank-transfer payment path: redirect URL, gateway callbacks, refunds.
//!
//! Booking payment state is written only by the IPN callback and by a
//! successful refund. The browser return is informational.

use chrono::{DateTime, Duration, Utc};
use coachline_core::clock::Clock;
use coachline_core::events::{publish_event, EventPublisher};
use coachline_core::repository::BookingStore;
use coachline_core::{BookingError, CoreResult};
use coachline_order::settlement;
use coachline_shared::models::events::{topics, BookingEvent};
use coachline_shared::{
    ApprovalStatus, Booking, BookingId, PaymentInfo, PaymentMethod, PaymentStatus, TripStatus,
};
use coachline_store::app_config::{BusinessRules, VnpayConfig};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::refund::RefundClient;
use crate::signing;
use crate::vnpay::{self, codes, RefundRequest, AMOUNT_MULTIPLIER};

/// Acknowledgement body returned to the gateway for every IPN delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnResponse {
    fn new(code: &str, message: &str) -> Self {
        Self {
            rsp_code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// What the browser return page is told.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnOutcome {
    pub valid_signature: bool,
    pub success: bool,
    pub booking_id: Option<String>,
    pub response_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub booking_id: BookingId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub approval_status: ApprovalStatus,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundCheck {
    pub refundable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

enum Settlement {
    Paid(Booking),
    Failed(Booking),
}

pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    refunds: Arc<dyn RefundClient>,
    config: VnpayConfig,
    refund_cutoff: Duration,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        refunds: Arc<dyn RefundClient>,
        config: VnpayConfig,
        rules: &BusinessRules,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            refunds,
            config,
            refund_cutoff: Duration::hours(rules.refund_cutoff_hours),
        }
    }

    async fn owned_booking(&self, booking_id: BookingId, user_id: &str) -> CoreResult<Booking> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if booking.user_id != user_id {
            return Err(BookingError::Forbidden(format!("booking {} belongs to another user", booking_id)));
        }
        Ok(booking)
    }

    /// Signs a redirect to the gateway and records the pending payment attempt.
    pub async fn create_payment_url(
        &self,
        booking_id: BookingId,
        user_id: &str,
        client_ip: &str,
        bank_code: Option<&str>,
    ) -> CoreResult<String> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if booking.user_id != user_id {
            return Err(BookingError::Forbidden(format!("booking {} belongs to another user", booking_id)));
        }
        if booking.payment_method != PaymentMethod::BankTransfer {
            return Err(BookingError::Validation(format!(
                "booking {} is not paid by bank transfer",
                booking_id
            )));
        }
        if booking.payment_status != PaymentStatus::Pending || !booking.is_active() || booking.deadline_passed(now) {
            return Err(BookingError::PaymentNotPending(booking_id));
        }

        let url = vnpay::payment_url(&self.config, &booking, client_ip, bank_code, now)?;

        booking.payment_info = Some(PaymentInfo {
            transaction_date: now,
            amount: booking.total_price,
            transaction_id: None,
        });
        booking.touch(now);
        tx.save_booking(&booking).await?;
        tx.commit().await?;

        info!("Payment URL issued for booking {} ({} VND)", booking_id, booking.total_price);
        Ok(url)
    }

    /// Server-to-server payment notification. Safe to deliver any number of times.
    pub async fn handle_ipn(&self, query: &BTreeMap<String, String>) -> IpnResponse {
        if !signing::verify(self.config.hash_secret.expose(), query) {
            warn!("IPN rejected: checksum mismatch for {:?}", query.get("vnp_TxnRef"));
            return IpnResponse::new(codes::CHECKSUM_FAILED, "Invalid Checksum");
        }

        let Some(booking_id) = query.get("vnp_TxnRef").and_then(|r| r.parse::<BookingId>().ok()) else {
            return IpnResponse::new(codes::ORDER_NOT_FOUND, "Order not found");
        };
        let Some(amount) = query.get("vnp_Amount").and_then(|a| a.parse::<i64>().ok()) else {
            return IpnResponse::new(codes::INVALID_AMOUNT, "Invalid amount");
        };

        match self.settle(booking_id, amount, query).await {
            Ok(Ok(outcome)) => {
                let now = self.clock.now().timestamp();
                match &outcome {
                    Settlement::Paid(booking) => {
                        let event = BookingEvent::from_booking(booking, "paid", now);
                        publish_event(self.events.as_ref(), topics::BOOKING_PAID, &booking.id.to_string(), &event).await;
                    }
                    Settlement::Failed(booking) => {
                        let event = BookingEvent::from_booking(booking, "payment_failed", now);
                        publish_event(
                            self.events.as_ref(),
                            topics::BOOKING_PAYMENT_FAILED,
                            &booking.id.to_string(),
                            &event,
                        )
                        .await;
                    }
                }
                IpnResponse::new(codes::SUCCESS, "Confirm Success")
            }
            Ok(Err(rejection)) => rejection,
            Err(e) => {
                error!("IPN for booking {} failed: {}", booking_id, e);
                IpnResponse::new(codes::RETRY, "Unknown error")
            }
        }
    }

    /// Applies a verified notification. The inner `Err` is a protocol rejection.
    async fn settle(
        &self,
        booking_id: BookingId,
        amount: i64,
        query: &BTreeMap<String, String>,
    ) -> CoreResult<Result<Settlement, IpnResponse>> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let Some(mut booking) = tx.booking_for_update(booking_id).await? else {
            return Ok(Err(IpnResponse::new(codes::ORDER_NOT_FOUND, "Order not found")));
        };
        if booking.deadline_passed(now) {
            warn!("IPN for booking {} arrived after its deadline", booking_id);
            return Ok(Err(IpnResponse::new(codes::INVALID_AMOUNT, "Order expired")));
        }
        if amount % AMOUNT_MULTIPLIER != 0 || amount / AMOUNT_MULTIPLIER != booking.total_price {
            warn!("IPN for booking {} carried amount {} (expected {})", booking_id, amount, booking.total_price);
            return Ok(Err(IpnResponse::new(codes::INVALID_AMOUNT, "Invalid amount")));
        }
        if booking.payment_status.is_settled() {
            return Ok(Err(IpnResponse::new(codes::ALREADY_CONFIRMED, "Order already confirmed")));
        }
        if booking.payment_status != PaymentStatus::Pending {
            return Ok(Err(IpnResponse::new(codes::INVALID_AMOUNT, "Order expired")));
        }

        let paid = query.get("vnp_ResponseCode").map(String::as_str) == Some(codes::SUCCESS)
            && query
                .get("vnp_TransactionStatus")
                .map_or(true, |status| status == codes::SUCCESS);

        if paid {
            booking.payment_status = PaymentStatus::Completed;
            booking.approval_status = ApprovalStatus::ConfirmedByProvider;
            booking.expires_at = None;
            booking.payment_info = Some(PaymentInfo {
                transaction_date: booking.payment_info.as_ref().map_or(now, |p| p.transaction_date),
                amount: booking.total_price,
                transaction_id: query.get("vnp_TransactionNo").cloned(),
            });
            booking.touch(now);
            let booked = settlement::book_seats(tx.as_mut(), &booking).await?;
            tx.save_booking(&booking).await?;
            tx.commit().await?;

            info!("Booking {} paid, {} seats booked", booking_id, booked);
            Ok(Ok(Settlement::Paid(booking)))
        } else {
            booking.payment_status = PaymentStatus::Failed;
            booking.approval_status = ApprovalStatus::Cancelled;
            booking.payment_info = None;
            booking.touch(now);
            let released = settlement::release_seats(tx.as_mut(), &booking).await?;
            tx.save_booking(&booking).await?;
            tx.commit().await?;

            info!(
                "Booking {} payment failed ({:?}), {} seats released",
                booking_id,
                query.get("vnp_ResponseCode"),
                released
            );
            Ok(Ok(Settlement::Failed(booking)))
        }
    }

    /// Browser redirect after checkout. Never writes.
    pub fn handle_return(&self, query: &BTreeMap<String, String>) -> ReturnOutcome {
        let valid_signature = signing::verify(self.config.hash_secret.expose(), query);
        let response_code = query.get("vnp_ResponseCode").cloned();
        ReturnOutcome {
            valid_signature,
            success: valid_signature && response_code.as_deref() == Some(codes::SUCCESS),
            booking_id: query.get("vnp_TxnRef").cloned(),
            response_code,
        }
    }

    pub async fn payment_status(&self, booking_id: BookingId, user_id: &str) -> CoreResult<PaymentStatusView> {
        let booking = self.owned_booking(booking_id, user_id).await?;
        Ok(PaymentStatusView {
            booking_id: booking.id,
            payment_method: booking.payment_method,
            payment_status: booking.payment_status,
            approval_status: booking.approval_status,
            amount: booking.total_price,
            transaction_id: booking.payment_info.and_then(|p| p.transaction_id),
            expires_at: booking.expires_at,
        })
    }

    pub async fn refundable(&self, booking_id: BookingId, user_id: &str) -> CoreResult<RefundCheck> {
        let booking = self.owned_booking(booking_id, user_id).await?;
        let reason = self.refund_blocker(&booking, self.clock.now()).await?;
        Ok(RefundCheck {
            refundable: reason.is_none(),
            reason,
        })
    }

    /// Why `booking` cannot be refunded at `now`, if anything.
    async fn refund_blocker(&self, booking: &Booking, now: DateTime<Utc>) -> CoreResult<Option<String>> {
        if booking.payment_status != PaymentStatus::Completed
            || booking.approval_status != ApprovalStatus::ConfirmedByProvider
        {
            return Ok(Some("booking is not paid and confirmed".to_string()));
        }
        if booking
            .payment_info
            .as_ref()
            .and_then(|p| p.transaction_id.as_ref())
            .is_none()
        {
            return Ok(Some("no gateway transaction recorded".to_string()));
        }

        let seats = self.store.get_seats(&booking.seat_ids).await?;
        let trip_ids: HashSet<_> = seats.iter().map(|s| s.trip_id).collect();
        if trip_ids.is_empty() {
            return Ok(Some("booking has no seats".to_string()));
        }
        for trip_id in trip_ids {
            let Some(trip) = self.store.get_trip(trip_id).await? else {
                return Ok(Some(format!("trip {} not found", trip_id)));
            };
            if trip.status != TripStatus::Scheduled {
                return Ok(Some(format!("trip {} is {}", trip_id, trip.status)));
            }
            if trip.departure_time - now < self.refund_cutoff {
                return Ok(Some(format!(
                    "trip {} departs in less than {} hours",
                    trip_id,
                    self.refund_cutoff.num_hours()
                )));
            }
        }
        Ok(None)
    }

    /// Refunds a settled bank-transfer booking and returns its seats to sale.
    pub async fn refund_payment(&self, booking_id: BookingId, user_id: &str, client_ip: &str) -> CoreResult<Booking> {
        // 1. Precondition check, no transaction held
        let booking = self.owned_booking(booking_id, user_id).await?;
        if let Some(reason) = self.refund_blocker(&booking, self.clock.now()).await? {
            return Err(BookingError::NotRefundable { id: booking_id, reason });
        }
        let not_recorded = || BookingError::NotRefundable {
            id: booking_id,
            reason: "no gateway transaction recorded".to_string(),
        };
        let payment = booking.payment_info.clone().ok_or_else(not_recorded)?;
        let transaction_no = payment.transaction_id.clone().ok_or_else(not_recorded)?;

        // 2. Gateway call
        let request = RefundRequest::full(
            &self.config,
            &booking,
            &payment,
            &transaction_no,
            user_id,
            client_ip,
            self.clock.now(),
        )?;
        let response = self.refunds.refund(&request).await?;
        if !response.is_success() {
            warn!("Gateway declined refund of {}: {} {}", booking_id, response.response_code, response.message);
            return Err(crate::GatewayError::Rejected {
                code: response.response_code,
                message: response.message,
            }
            .into());
        }

        // 3. Apply locally
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if booking.payment_status != PaymentStatus::Completed {
            error!(
                "Booking {} changed to {} while its refund was in flight",
                booking_id, booking.payment_status
            );
            return Err(BookingError::NotRefundable {
                id: booking_id,
                reason: format!("payment is {}", booking.payment_status),
            });
        }
        booking.payment_status = PaymentStatus::Failed;
        booking.approval_status = ApprovalStatus::Cancelled;
        booking.touch(now);
        let released = settlement::release_seats(tx.as_mut(), &booking).await?;
        tx.save_booking(&booking).await?;
        tx.commit().await?;

        info!("Booking {} refunded, {} seats released", booking_id, released);
        let event = BookingEvent::from_booking(&booking, "refunded", now.timestamp());
        publish_event(self.events.as_ref(), topics::BOOKING_REFUNDED, &booking.id.to_string(), &event).await;
        Ok(booking)
    }
}
