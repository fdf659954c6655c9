use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub const CUSTOMER: &str = "CUSTOMER";
pub const PROVIDER: &str = "PROVIDER";

// ============================================================================
// JWT Claims
// ============================================================================

/// `sub` is the customer id or the provider id, depending on `role`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

fn authenticate(state: &AppState, req: &Request, role: &str) -> Result<Claims, StatusCode> {
    // 1. Extract token from Authorization header
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.expose().as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Check role
    if token_data.claims.role != role {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(token_data.claims)
}

// ============================================================================
// Role middlewares
// ============================================================================

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = authenticate(&state, &req, CUSTOMER)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn provider_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = authenticate(&state, &req, PROVIDER)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
