use axum::{
    extract::{Query, State},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use coachline_payment::{IpnResponse, ReturnOutcome};
use coachline_shared::{Booking, BookingId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::AppError,
    middleware::{customer_auth_middleware, resiliency::circuit_breaker_middleware, Claims},
    state::AppState,
    ClientIp,
};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentUrlRequest {
    pub booking_id: BookingId,
    pub bank_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentUrlResponse {
    pub payment_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub booking_id: BookingId,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let customer = Router::new()
        .route("/v1/payments/create-payment-url", post(create_payment_url))
        .merge(
            Router::new()
                .route("/v1/payments/refund", post(refund))
                .route_layer(middleware::from_fn_with_state(state.clone(), circuit_breaker_middleware)),
        )
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware));

    // The gateway authenticates with its signature, not a JWT
    let gateway = Router::new()
        .route("/v1/payments/vnpay_ipn", get(vnpay_ipn))
        .route("/v1/payments/vnpay_return", get(vnpay_return));

    customer.merge(gateway)
}

async fn create_payment_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(req): Json<CreatePaymentUrlRequest>,
) -> Result<Json<CreatePaymentUrlResponse>, AppError> {
    let payment_url = state
        .payments
        .create_payment_url(req.booking_id, &claims.sub, &ip, req.bank_code.as_deref())
        .await?;
    Ok(Json(CreatePaymentUrlResponse { payment_url }))
}

/// Always answers 200; the gateway reads `RspCode`.
async fn vnpay_ipn(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Json<IpnResponse> {
    Json(state.payments.handle_ipn(&query).await)
}

async fn vnpay_return(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Json<ReturnOutcome> {
    Json(state.payments.handle_return(&query))
}

async fn refund(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.payments.refund_payment(req.booking_id, &claims.sub, &ip).await?))
}
