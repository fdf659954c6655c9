use axum::{
    extract::State,
    middleware,
    routing::post,
    Extension, Json, Router,
};
use coachline_core::events::publish_event;
use coachline_shared::models::events::{topics, SeatsLockedEvent, SeatsUnlockedEvent};
use coachline_shared::{Seat, SeatId, TripId};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, middleware::{customer_auth_middleware, Claims}, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LockSeatRequest {
    pub seat_id: SeatId,
}

#[derive(Debug, Deserialize)]
pub struct LockSeatsRequest {
    pub trip_id: TripId,
    pub seat_ids: Vec<SeatId>,
    pub origin_stop: String,
    pub destination_stop: String,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub seat_ids: Vec<SeatId>,
}

#[derive(Debug, Serialize)]
pub struct LockedSeatsResponse {
    pub seats: Vec<Seat>,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub released: Vec<SeatId>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/lock", post(lock_seat))
        .route("/v1/tickets/lock-many", post(lock_many))
        .route("/v1/tickets/unlock", post(unlock))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

async fn announce_locked(state: &AppState, seats: &[Seat], user_id: &str) {
    let (Some(first), Some(expires_at)) = (seats.first(), seats.iter().filter_map(|s| s.lock_expires_at).min()) else {
        return;
    };
    let event = SeatsLockedEvent {
        trip_id: first.trip_id,
        seat_ids: seats.iter().map(|s| s.id).collect(),
        user_id: user_id.to_string(),
        expires_at: expires_at.timestamp(),
    };
    publish_event(state.events.as_ref(), topics::SEATS_LOCKED, &first.trip_id.to_string(), &event).await;
}

async fn lock_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LockSeatRequest>,
) -> Result<Json<Seat>, AppError> {
    let seat = state.reservations.lock_seat(req.seat_id, &claims.sub).await?;
    announce_locked(&state, std::slice::from_ref(&seat), &claims.sub).await;
    Ok(Json(seat))
}

async fn lock_many(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LockSeatsRequest>,
) -> Result<Json<LockedSeatsResponse>, AppError> {
    let seats = state
        .reservations
        .lock_multiple_seats(req.trip_id, &req.seat_ids, &claims.sub, &req.origin_stop, &req.destination_stop)
        .await?;
    announce_locked(&state, &seats, &claims.sub).await;
    Ok(Json(LockedSeatsResponse { seats }))
}

async fn unlock(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, AppError> {
    let released = state.reservations.unlock_tickets(&req.seat_ids, &claims.sub).await?;
    if !released.is_empty() {
        let event = SeatsUnlockedEvent {
            seat_ids: released.clone(),
            user_id: claims.sub.clone(),
            released: released.len() as u64,
        };
        publish_event(state.events.as_ref(), topics::SEATS_UNLOCKED, &claims.sub, &event).await;
    }
    Ok(Json(UnlockResponse { released }))
}
