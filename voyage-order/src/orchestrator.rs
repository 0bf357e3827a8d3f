use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use voyage_core::payment::{LineItem, PayerInfo, PaymentGateway, PaymentRequest};
use voyage_core::repository::{BookingNotifier, ReservationStore};
use voyage_core::{
    Booking, BookingStatus, Currency, Payment, PaymentMode, PaymentStatus, ReservationError,
};
use voyage_payment::tran_id::booking_prefix;
use voyage_shared::models::events::{NotificationEvent, PaymentStatusChangedEvent};

/// Attempts at finding an unused transaction id before giving up.
const TRAN_ID_ATTEMPTS: usize = 5;

/// What the customer needs to pay.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub booking_id: Uuid,
    pub tran_id: String,
    pub status: PaymentStatus,
    pub mode: PaymentMode,
    pub payable_reference: Option<String>,
    pub deeplink: Option<String>,
    /// As signed and sent to the provider.
    pub amount: String,
    pub currency: Currency,
    pub expires_at: DateTime<Utc>,
}

/// Starts payment attempts for pending bookings.
pub struct PaymentOrchestrator {
    store: Arc<dyn ReservationStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn BookingNotifier>,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn BookingNotifier>,
    ) -> Self {
        Self { store, gateway, notifier }
    }

    /// Register a new payment attempt and ask the provider for a payable reference.
    ///
    /// The pending payment is committed before the provider is called, so a
    /// callback can never arrive for a transaction we do not know.
    pub async fn initiate(
        &self,
        booking_id: Uuid,
        owner_id: &str,
        payer: PayerInfo,
    ) -> Result<PaymentInitiation, ReservationError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let booking = match tx.lock_booking(booking_id).await? {
            Some(b) if b.owner_id == owner_id => b,
            _ => return Err(ReservationError::BookingNotFound(booking_id)),
        };
        if booking.status != BookingStatus::Pending {
            return Err(ReservationError::BookingNotPayable {
                booking_id,
                status: booking.status.to_string(),
            });
        }
        if booking.expires_at < now {
            return Err(ReservationError::BookingNotPayable {
                booking_id,
                status: "overdue".to_string(),
            });
        }

        let prefix = booking_prefix(&booking.id);
        let mut tran_id = None;
        for _ in 0..TRAN_ID_ATTEMPTS {
            let candidate = self.gateway.compose_tran_id(&prefix)?;
            if !tx.tran_id_exists(&candidate).await? {
                tran_id = Some(candidate);
                break;
            }
            warn!("Transaction id {} already used, regenerating", candidate);
        }
        let tran_id = tran_id.ok_or_else(|| {
            ReservationError::Storage(format!("no unused transaction id for booking {}", booking_id))
        })?;

        let payment = Payment::new_pending(
            booking.id,
            tran_id.clone(),
            booking.total_amount,
            booking.currency,
            self.gateway.mode(),
        );
        tx.insert_payment(&payment).await?;
        tx.commit().await?;

        let request = PaymentRequest {
            tran_id: tran_id.clone(),
            amount: booking.total_amount,
            currency: booking.currency,
            items: line_items(&booking),
            payer,
        };

        match self.gateway.initiate(&request).await {
            Ok(response) => {
                let mut tx = self.store.begin().await?;
                if let Some(mut stored) = tx.lock_payment(&tran_id).await? {
                    stored.payable_reference = response.payable_reference.clone();
                    tx.update_payment(&stored, Some(&response.raw)).await?;
                }
                tx.commit().await?;

                info!(
                    "Payment {} initiated for booking {} ({} {})",
                    tran_id, booking.id, response.amount, response.currency
                );
                Ok(PaymentInitiation {
                    booking_id: booking.id,
                    tran_id,
                    status: PaymentStatus::Pending,
                    mode: self.gateway.mode(),
                    payable_reference: response.payable_reference,
                    deeplink: response.deeplink,
                    amount: response.amount,
                    currency: response.currency,
                    expires_at: booking.expires_at,
                })
            }
            Err(ReservationError::GatewayRejected { code, message }) => {
                self.fail_payment(&tran_id, &code, &message).await?;
                Err(ReservationError::GatewayRejected { code, message })
            }
            Err(e) => {
                // The provider may or may not have registered it; a poll decides.
                error!(
                    "Payment {} for booking {} left pending: {}",
                    tran_id, booking.id, e
                );
                Err(e)
            }
        }
    }

    async fn fail_payment(&self, tran_id: &str, code: &str, message: &str) -> Result<(), ReservationError> {
        let mut tx = self.store.begin().await?;
        let Some(mut payment) = tx.lock_payment(tran_id).await? else {
            return Ok(());
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(());
        }

        payment.status = PaymentStatus::Failed;
        let payload = json!({ "code": code, "message": message });
        tx.update_payment(&payment, Some(&payload)).await?;
        tx.commit().await?;

        warn!("Payment {} rejected by provider ({}): {}", tran_id, code, message);
        self.notifier.notify(NotificationEvent::PaymentStatusChanged(PaymentStatusChangedEvent {
            booking_id: payment.booking_id,
            tran_id: tran_id.to_string(),
            status: payment.status.as_str().to_string(),
            timestamp: Utc::now().timestamp(),
        }));
        Ok(())
    }
}

fn line_items(booking: &Booking) -> Vec<LineItem> {
    booking
        .items
        .iter()
        .map(|item| LineItem {
            name: format!("{} {}", item.unit.kind(), &item.unit.unit_id().simple().to_string()[..8]),
            quantity: item.quantity,
            price: item.unit_price,
        })
        .filter(|item| item.price > Decimal::ZERO)
        .collect()
}
