use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use voyage_core::PaymentStatus;
pub use voyage_payment::signature::SIGNATURE_HEADER;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
    pub booking_id: Uuid,
    pub payment_status: PaymentStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Provider push. No-ops and conflicts still answer 200 so the provider stops retrying.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());

    let outcome = state.reconciler.handle_webhook(&body, signature).await?;
    tracing::info!(
        "Webhook for {} handled: {:?} ({})",
        outcome.tran_id,
        outcome.action,
        outcome.message
    );

    Ok(Json(WebhookResponse {
        message: outcome.message,
        booking_id: outcome.booking_id,
        payment_status: outcome.payment_status,
    }))
}
