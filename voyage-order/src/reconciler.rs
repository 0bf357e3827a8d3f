use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use voyage_core::payment::PaymentGateway;
use voyage_core::repository::{BookingNotifier, ReservationStore};
use voyage_core::{BookingStatus, PaymentStatus, ReservationError, TransitionOutcome};
use voyage_payment::signature::verify_webhook;
use voyage_shared::models::events::{NotificationEvent, PaymentStatusChangedEvent};
use voyage_shared::Masked;

use crate::booking::{settle_paid, status_event};
use crate::extract::{classify, extract_status, extract_tran_id, query_rejection, ProviderOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// State changed.
    Applied,
    /// Nothing to do: duplicate delivery, still pending, or already final.
    NoOp,
    /// Money moved for a booking that can no longer be paid. Needs a human.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub booking_id: Uuid,
    pub tran_id: String,
    pub payment_status: PaymentStatus,
    pub action: ReconcileAction,
    pub message: String,
}

/// Applies webhook and poll results to payments and bookings.
///
/// Every event for a transaction runs under a lock on its payment row, then
/// its booking row, so a webhook and a concurrent poll cannot both settle it.
pub struct PaymentReconciler {
    store: Arc<dyn ReservationStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn BookingNotifier>,
    webhook_secret: Option<Masked<String>>,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn BookingNotifier>,
        webhook_secret: Option<Masked<String>>,
    ) -> Self {
        Self { store, gateway, notifier, webhook_secret }
    }

    /// Inbound push. The signature is checked against the raw bytes before anything is parsed.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReservationError> {
        if let Some(secret) = &self.webhook_secret {
            if !verify_webhook(body, signature, secret.expose()) {
                warn!(
                    target: "security",
                    "Rejected payment webhook: signature {} ({} bytes)",
                    if signature.is_some() { "mismatch" } else { "missing" },
                    body.len()
                );
                return Err(ReservationError::SignatureInvalid);
            }
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| ReservationError::Validation(format!("webhook body is not JSON: {}", e)))?;
        let tran_id = extract_tran_id(&payload).ok_or_else(|| {
            warn!("Payment webhook without a transaction id: {}", payload);
            ReservationError::MissingTransactionId
        })?;

        self.apply(&tran_id, provider_outcome(&tran_id, &payload), &payload).await
    }

    /// Caller-initiated pull of the provider's view of `tran_id`.
    pub async fn poll(&self, tran_id: &str) -> Result<ReconcileOutcome, ReservationError> {
        if self.store.get_payment(tran_id).await?.is_none() {
            warn!("Status poll for unknown transaction {}", tran_id);
            return Err(ReservationError::UnknownTransaction(tran_id.to_string()));
        }

        let payload = self.gateway.check_transaction(tran_id).await?;
        if let Some(rejection) = query_rejection(&payload) {
            warn!("Status check for {} refused by provider: {}", tran_id, payload);
            return Err(rejection);
        }
        self.apply(tran_id, provider_outcome(tran_id, &payload), &payload).await
    }

    /// Move the payment (and booking) as far as `outcome` allows.
    ///
    /// Only `pending` and `failed` payments move. A late success after a failure
    /// wins; nothing moves a successful payment.
    pub async fn apply(
        &self,
        tran_id: &str,
        outcome: ProviderOutcome,
        payload: &Value,
    ) -> Result<ReconcileOutcome, ReservationError> {
        let mut tx = self.store.begin().await?;

        let Some(mut payment) = tx.lock_payment(tran_id).await? else {
            warn!("Payment event for unknown transaction {}: {}", tran_id, payload);
            return Err(ReservationError::UnknownTransaction(tran_id.to_string()));
        };
        let booking_id = payment.booking_id;
        let previous = payment.status;

        let mut paid_booking = None;
        let mut result = ReconcileOutcome {
            booking_id,
            tran_id: tran_id.to_string(),
            payment_status: previous,
            action: ReconcileAction::NoOp,
            message: String::new(),
        };

        match (previous, outcome) {
            (PaymentStatus::Success, ProviderOutcome::Approved) => {
                result.message = "payment already settled".to_string();
            }
            (PaymentStatus::Success, _) => {
                warn!(
                    "Ignoring {:?} for settled transaction {} (booking {}): {}",
                    outcome, tran_id, booking_id, payload
                );
                result.message = "payment already settled; later status ignored".to_string();
            }
            (_, ProviderOutcome::Pending) => {
                result.message = "awaiting provider confirmation".to_string();
            }
            (PaymentStatus::Failed, ProviderOutcome::Declined) => {
                result.message = "payment already failed".to_string();
            }
            (PaymentStatus::Pending, ProviderOutcome::Declined) => {
                payment.status = PaymentStatus::Failed;
                tx.update_payment(&payment, Some(payload)).await?;
                result.action = ReconcileAction::Applied;
                result.message = "payment failed".to_string();
            }
            (_, ProviderOutcome::Approved) => {
                payment.status = PaymentStatus::Success;
                payment.paid_at = Some(Utc::now());
                tx.update_payment(&payment, Some(payload)).await?;

                let mut booking = tx
                    .lock_booking(booking_id)
                    .await?
                    .ok_or(ReservationError::BookingNotFound(booking_id))?;

                match settle_paid(tx.as_mut(), &mut booking).await? {
                    TransitionOutcome::Applied => {
                        result.action = ReconcileAction::Applied;
                        result.message = "payment successful".to_string();
                        paid_booking = Some(booking);
                    }
                    TransitionOutcome::AlreadyFinal(status) => {
                        error!(
                            "Transaction {} captured for booking {} in status {}; manual reconciliation needed. Payload: {}",
                            tran_id, booking_id, status, payload
                        );
                        result.action = ReconcileAction::Conflict;
                        result.message = match status {
                            BookingStatus::Paid => "booking already paid by another transaction".to_string(),
                            other => format!("payment received for {} booking", other),
                        };
                    }
                }
            }
        }

        result.payment_status = payment.status;
        if result.action == ReconcileAction::NoOp {
            tx.rollback().await?;
            info!("Transaction {}: {}", tran_id, result.message);
            return Ok(result);
        }

        tx.commit().await?;
        info!("Transaction {} {} -> {}: {}", tran_id, previous, payment.status, result.message);
        self.notify_payment(&result);
        if let Some(booking) = paid_booking {
            self.notifier.notify(status_event(&booking));
        }
        Ok(result)
    }

    fn notify_payment(&self, result: &ReconcileOutcome) {
        self.notifier.notify(NotificationEvent::PaymentStatusChanged(PaymentStatusChangedEvent {
            booking_id: result.booking_id,
            tran_id: result.tran_id.clone(),
            status: result.payment_status.as_str().to_string(),
            timestamp: Utc::now().timestamp(),
        }));
    }
}

fn provider_outcome(tran_id: &str, payload: &Value) -> ProviderOutcome {
    match extract_status(payload) {
        Some(code) => classify(&code),
        None => {
            warn!("No status in payment payload for {}: {}", tran_id, payload);
            ProviderOutcome::Pending
        }
    }
}
