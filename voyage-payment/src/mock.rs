use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use voyage_core::payment::{GatewayResponse, PaymentGateway, PaymentRequest};
use voyage_core::{PaymentMode, ReservationError};

use crate::amount::format_amount;
use crate::tran_id::{compose_tran_id, unique_suffix};

/// How the mock answers `initiate`.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Approve,
    Reject { code: String, message: String },
    Unavailable,
}

/// In-process gateway for tests and local runs without provider credentials.
pub struct MockPaymentGateway {
    mode: PaymentMode,
    tran_id_max_len: usize,
    behavior: Mutex<MockBehavior>,
    statuses: Mutex<HashMap<String, Value>>,
    initiated: Mutex<Vec<PaymentRequest>>,
}

impl MockPaymentGateway {
    pub fn new(mode: PaymentMode) -> Self {
        Self {
            mode,
            tran_id_max_len: 20,
            behavior: Mutex::new(MockBehavior::Approve),
            statuses: Mutex::new(HashMap::new()),
            initiated: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut b) = self.behavior.lock() {
            *b = behavior;
        }
    }

    /// Payload returned by `check_transaction` for `tran_id`.
    pub fn set_transaction_status(&self, tran_id: &str, payload: Value) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(tran_id.to_string(), payload);
        }
    }

    /// Requests received by `initiate`, in order.
    pub fn initiated(&self) -> Vec<PaymentRequest> {
        self.initiated.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn mode(&self) -> PaymentMode {
        self.mode
    }

    fn compose_tran_id(&self, prefix: &str) -> Result<String, ReservationError> {
        compose_tran_id(prefix, &unique_suffix(), self.tran_id_max_len)
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<GatewayResponse, ReservationError> {
        let amount = format_amount(request.amount, request.currency)?;
        if let Ok(mut initiated) = self.initiated.lock() {
            initiated.push(request.clone());
        }

        let behavior = self
            .behavior
            .lock()
            .map(|b| b.clone())
            .unwrap_or(MockBehavior::Unavailable);

        match behavior {
            MockBehavior::Approve => {
                let reference = match self.mode {
                    PaymentMode::Qr => format!("mock-qr-{}", request.tran_id),
                    PaymentMode::Purchase => format!("https://checkout.mock/{}", request.tran_id),
                };
                Ok(GatewayResponse {
                    success: true,
                    payable_reference: Some(reference.clone()),
                    deeplink: None,
                    amount,
                    currency: request.currency,
                    raw: json!({ "status": { "code": "0" }, "reference": reference }),
                })
            }
            MockBehavior::Reject { code, message } => {
                Err(ReservationError::GatewayRejected { code, message })
            }
            MockBehavior::Unavailable => Err(ReservationError::GatewayUnavailable(
                "mock gateway unavailable".to_string(),
            )),
        }
    }

    async fn check_transaction(&self, tran_id: &str) -> Result<Value, ReservationError> {
        let statuses = self
            .statuses
            .lock()
            .map_err(|_| ReservationError::GatewayUnavailable("mock state poisoned".to_string()))?;
        Ok(statuses.get(tran_id).cloned().unwrap_or_else(|| {
            json!({ "data": { "payment_status_code": 1 }, "tran_id": tran_id })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use voyage_core::payment::PayerInfo;
    use voyage_core::Currency;

    fn request() -> PaymentRequest {
        PaymentRequest {
            tran_id: "BKAAAA0000MOCK".to_string(),
            amount: Decimal::new(1250, 2),
            currency: Currency::Usd,
            items: vec![],
            payer: PayerInfo::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_behaviors() {
        let gateway = MockPaymentGateway::new(PaymentMode::Qr);
        let ok = gateway.initiate(&request()).await.unwrap();
        assert_eq!(ok.amount, "12.50");
        assert_eq!(ok.payable_reference.as_deref(), Some("mock-qr-BKAAAA0000MOCK"));

        gateway.set_behavior(MockBehavior::Reject { code: "5".into(), message: "Declined".into() });
        assert!(matches!(
            gateway.initiate(&request()).await,
            Err(ReservationError::GatewayRejected { .. })
        ));

        gateway.set_behavior(MockBehavior::Unavailable);
        assert!(matches!(
            gateway.initiate(&request()).await,
            Err(ReservationError::GatewayUnavailable(_))
        ));
        assert_eq!(gateway.initiated().len(), 3);
    }

    #[tokio::test]
    async fn test_check_defaults_to_pending() {
        let gateway = MockPaymentGateway::new(PaymentMode::Purchase);
        let payload = gateway.check_transaction("BKX").await.unwrap();
        assert_eq!(payload["data"]["payment_status_code"], 1);

        gateway.set_transaction_status("BKX", json!({ "status": { "code": "00" } }));
        let payload = gateway.check_transaction("BKX").await.unwrap();
        assert_eq!(payload["status"]["code"], "00");
    }
}
