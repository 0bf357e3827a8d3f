use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};
use voyage_core::payment::{GatewayResponse, PaymentGateway, PaymentRequest};
use voyage_core::{PaymentMode, ReservationError};

use crate::amount::format_amount;
use crate::config::GatewayConfig;
use crate::request::{build_check_request, build_payment_request, request_time, SignedRequest};
use crate::response::parse_initiation;
use crate::tran_id::{compose_tran_id, unique_suffix};

enum Body {
    Form,
    Json,
}

/// HTTP client for the PayWay-style provider.
#[derive(Clone)]
pub struct PaywayClient {
    config: GatewayConfig,
    http: Client,
}

impl PaywayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, ReservationError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ReservationError::GatewayUnavailable(format!("http client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn post(&self, url: &str, signed: &SignedRequest, body: Body) -> Result<Value, ReservationError> {
        let tran_id = signed.field("tran_id").unwrap_or_default();
        let builder = self.http.post(url);
        let builder = match body {
            Body::Form => builder.form(&signed.form()),
            Body::Json => builder.json(&signed.json()),
        };

        let response = builder.send().await.map_err(|e| {
            error!(
                "Gateway call for {} failed: {} (timeout: {}, hashed: {})",
                tran_id,
                e,
                e.is_timeout(),
                signed.canonical
            );
            ReservationError::GatewayUnavailable(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReservationError::GatewayUnavailable(e.to_string()))?;

        if !status.is_success() {
            error!(
                "Gateway returned HTTP {} for {}: body={} hashed={}",
                status, tran_id, text, signed.canonical
            );
            return Err(ReservationError::GatewayUnavailable(format!("HTTP {}", status)));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Gateway returned a non-JSON body for {}: {} ({})", tran_id, text, e);
            ReservationError::GatewayUnavailable("malformed response body".to_string())
        })
    }
}

#[async_trait]
impl PaymentGateway for PaywayClient {
    fn mode(&self) -> PaymentMode {
        self.config.mode
    }

    fn compose_tran_id(&self, prefix: &str) -> Result<String, ReservationError> {
        compose_tran_id(prefix, &unique_suffix(), self.config.tran_id_max_len)
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<GatewayResponse, ReservationError> {
        let amount = format_amount(request.amount, request.currency)?;
        let signed = build_payment_request(&self.config, request, &request_time(Utc::now()))?;

        info!(
            "Initiating {} payment {} for {} {}",
            self.config.mode.as_str(),
            request.tran_id,
            amount,
            request.currency
        );

        // Purchase endpoints take form posts; QR generation takes JSON.
        let body = match self.config.mode {
            PaymentMode::Purchase => Body::Form,
            PaymentMode::Qr => Body::Json,
        };
        let raw = self.post(self.config.endpoint(), &signed, body).await?;

        parse_initiation(raw, amount, request.currency).map_err(|e| {
            if let ReservationError::GatewayRejected { code, message } = &e {
                warn!(
                    "Gateway rejected {} with code {}: {} (hashed: {})",
                    request.tran_id, code, message, signed.canonical
                );
            }
            e
        })
    }

    async fn check_transaction(&self, tran_id: &str) -> Result<Value, ReservationError> {
        let signed = build_check_request(&self.config, tran_id, &request_time(Utc::now()))?;
        self.post(&self.config.check_endpoint, &signed, Body::Json).await
    }
}
