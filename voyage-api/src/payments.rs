use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use voyage_core::payment::PayerInfo;
use voyage_core::ReservationError;
use voyage_order::{PaymentInitiation, ReconcileOutcome};

use crate::{error::AppError, middleware::CustomerClaims, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub payer: Option<PayerInfo>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}/payments", post(initiate_payment))
        .route("/v1/payments/{tran_id}/check", post(check_payment))
}

/// POST /v1/bookings/{id}/payments
/// Start a payment attempt and return what the customer pays with
async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentInitiation>), AppError> {
    let initiation = state
        .payments
        .initiate(booking_id, &claims.sub, req.payer.unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(initiation)))
}

/// POST /v1/payments/{tran_id}/check
/// Ask the provider for the transaction's current status and apply it
async fn check_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(tran_id): Path<String>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    let unknown = || ReservationError::UnknownTransaction(tran_id.clone());

    let payment = state.store.get_payment(&tran_id).await?.ok_or_else(unknown)?;
    match state.bookings.get_for_owner(payment.booking_id, &claims.sub).await {
        Ok(_) => {}
        Err(ReservationError::BookingNotFound(_)) => return Err(unknown().into()),
        Err(e) => return Err(e.into()),
    }

    let outcome = state.reconciler.poll(&tran_id).await?;
    Ok(Json(outcome))
}
