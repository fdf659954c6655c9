use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use coachline_core::events::publish_event;
use coachline_payment::{PaymentStatusView, RefundCheck};
use coachline_shared::models::events::{topics, BookingEvent};
use coachline_shared::{Booking, BookingId, PaymentMethod, SeatId};
use serde::Deserialize;

use crate::{
    error::AppError,
    middleware::{customer_auth_middleware, provider_auth_middleware, Claims},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub seat_ids: Vec<SeatId>,
    pub origin_stop: String,
    pub destination_stop: String,
    pub payment_method: PaymentMethod,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let customer = Router::new()
        .route("/v1/bookings/confirm", post(confirm_booking))
        .route("/v1/bookings/{booking_id}/payment-status", get(payment_status))
        .route("/v1/bookings/{booking_id}/refundable", get(refundable))
        .route_layer(middleware::from_fn_with_state(state.clone(), customer_auth_middleware));

    let provider = Router::new()
        .route("/v1/bookings/{booking_id}/approve", patch(approve_booking))
        .route_layer(middleware::from_fn_with_state(state, provider_auth_middleware));

    customer.merge(provider)
}

async fn publish_booking(state: &AppState, topic: &str, booking: &Booking, status: &str) {
    let event = BookingEvent::from_booking(booking, status, booking.updated_at.timestamp());
    publish_event(state.events.as_ref(), topic, &booking.id.to_string(), &event).await;
}

async fn confirm_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConfirmBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state
        .bookings
        .confirm_booking(
            &req.seat_ids,
            &claims.sub,
            &req.origin_stop,
            &req.destination_stop,
            req.payment_method,
        )
        .await?;
    publish_booking(&state, topics::BOOKING_CONFIRMED, &booking, "confirmed").await;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn approve_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.approve_booking(booking_id, &claims.sub).await?;
    publish_booking(&state, topics::BOOKING_APPROVED, &booking, "approved").await;
    Ok(Json(booking))
}

async fn payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<PaymentStatusView>, AppError> {
    Ok(Json(state.payments.payment_status(booking_id, &claims.sub).await?))
}

async fn refundable(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<RefundCheck>, AppError> {
    Ok(Json(state.payments.refundable(booking_id, &claims.sub).await?))
}
