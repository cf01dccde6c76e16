use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marquee_booking::BookingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Booking(err) => booking_response(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "success": false, "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "success": false, "error": "Internal Server Error" }),
    )
}

fn booking_response(err: BookingError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        BookingError::Validation { fields, .. } => (
            StatusCode::BAD_REQUEST,
            json!({ "success": false, "error": message, "fields": fields }),
        ),
        BookingError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, json!({ "success": false, "error": message })),
        BookingError::NotFound { .. } => (StatusCode::NOT_FOUND, json!({ "success": false, "error": message })),
        BookingError::InvalidCode => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "success": false, "error": message }),
        ),
        BookingError::SeatConflict(seats) => (
            StatusCode::CONFLICT,
            json!({ "success": false, "error": message, "conflicting_seats": seats }),
        ),
        BookingError::InvalidTransition { .. } => (StatusCode::CONFLICT, json!({ "success": false, "error": message })),
        BookingError::Storage(_) | BookingError::Repository(_) => {
            tracing::error!("Internal Server Error: {}", message);
            internal()
        }
    }
}
