use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyage_core::{Booking, BookingItem, BookingStatus, Currency, UnitRef};

use crate::{error::AppError, middleware::CustomerClaims, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub items: Vec<UnitRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub status: BookingStatus,
    pub items: Vec<BookingItemResponse>,
    pub total_amount: String,
    pub currency: Currency,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingItemResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub unit: UnitRef,
    pub quantity: i32,
    pub unit_price: String,
    pub total: String,
}

impl From<BookingItem> for BookingItemResponse {
    fn from(item: BookingItem) -> Self {
        Self {
            id: item.id,
            unit: item.unit,
            quantity: item.quantity,
            unit_price: item.unit_price.to_string(),
            total: item.total.to_string(),
        }
    }
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            status: booking.status,
            items: booking.items.into_iter().map(Into::into).collect(),
            total_amount: booking.total_amount.to_string(),
            currency: booking.currency,
            expires_at: booking.expires_at,
            created_at: booking.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
}

/// POST /v1/bookings
/// Hold every requested unit for the caller, or none of them
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = state.bookings.create(&claims.sub, req.items).await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.get_for_owner(booking_id, &claims.sub).await?;
    Ok(Json(booking.into()))
}
