use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coachline_core::{BookingError, ErrorKind};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::ExternalGateway => StatusCode::BAD_GATEWAY,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Booking(err) = self;
        let kind = err.kind();
        let status = status_for(kind);
        let message = if kind == ErrorKind::Internal {
            tracing::error!("Internal Server Error: {}", err);
            "Internal Server Error".to_string()
        } else {
            err.to_string()
        };
        let mut body = json!({ "error": message, "kind": kind });
        if !err.seat_ids().is_empty() {
            body["seat_ids"] = json!(err.seat_ids());
        }

        (status, Json(body)).into_response()
    }
}
