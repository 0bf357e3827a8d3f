use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use voyage_core::ReservationError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    Reservation(ReservationError),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
            AppError::Reservation(err) => reservation_response(err),
        };

        (status, Json(body)).into_response()
    }
}

fn reservation_response(err: ReservationError) -> (StatusCode, Value) {
    let message = err.to_string();
    match err {
        ReservationError::InventoryConflict { units } => (
            StatusCode::CONFLICT,
            json!({ "error": message, "unavailable_units": units }),
        ),
        ReservationError::Validation(_) | ReservationError::MissingTransactionId => {
            (StatusCode::BAD_REQUEST, json!({ "error": message }))
        }
        ReservationError::UnknownTransaction(_) | ReservationError::BookingNotFound(_) => {
            (StatusCode::NOT_FOUND, json!({ "error": message }))
        }
        ReservationError::SignatureInvalid => (StatusCode::UNAUTHORIZED, json!({ "error": message })),
        ReservationError::BookingNotPayable { .. } => (StatusCode::CONFLICT, json!({ "error": message })),
        ReservationError::GatewayRejected { code, message } => (
            StatusCode::PAYMENT_REQUIRED,
            json!({ "error": message, "provider_code": code }),
        ),
        ReservationError::GatewayUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": "Payment provider unavailable, please retry" }),
        ),
        ReservationError::Storage(_) => {
            tracing::error!("Internal Server Error: {}", message);
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        Self::Reservation(err)
    }
}
