use serde::Deserialize;
use voyage_core::PaymentMode;
use voyage_shared::Masked;

/// Everything the gateway client needs. Passed into the constructor so tests can inject fixtures.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub merchant_id: String,
    /// Shared secret for request signing.
    pub api_key: Masked<String>,
    pub mode: PaymentMode,
    pub qr_endpoint: String,
    pub purchase_endpoint: String,
    pub check_endpoint: String,
    /// Where the provider pushes status callbacks. Sent base64-encoded.
    pub callback_url: String,
    #[serde(default)]
    pub return_deeplink: Option<String>,
    #[serde(default = "default_payment_option")]
    pub payment_option: String,
    /// How long the payable reference stays valid.
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_tran_id_max_len")]
    pub tran_id_max_len: usize,
    /// When set, inbound webhooks must carry a valid signature.
    #[serde(default)]
    pub webhook_secret: Option<Masked<String>>,
}

fn default_payment_option() -> String { "abapay_khqr".to_string() }
fn default_lifetime_minutes() -> u32 { 10 }
fn default_timeout_seconds() -> u64 { 30 }
fn default_tran_id_max_len() -> usize { 20 }

/// Upper bound on any single provider call.
pub const MAX_TIMEOUT_SECONDS: u64 = 30;

impl GatewayConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.clamp(1, MAX_TIMEOUT_SECONDS))
    }

    pub fn endpoint(&self) -> &str {
        match self.mode {
            PaymentMode::Qr => &self.qr_endpoint,
            PaymentMode::Purchase => &self.purchase_endpoint,
        }
    }

    #[cfg(test)]
    pub(crate) fn fixture(mode: PaymentMode) -> Self {
        Self {
            merchant_id: "ec000002".to_string(),
            api_key: Masked::new("test-api-key".to_string()),
            mode,
            qr_endpoint: "https://sandbox.example.com/api/payment-gateway/v1/payments/generate-qr".to_string(),
            purchase_endpoint: "https://sandbox.example.com/api/payment-gateway/v1/payments/purchase".to_string(),
            check_endpoint: "https://sandbox.example.com/api/payment-gateway/v1/payments/check-transaction-2".to_string(),
            callback_url: "https://api.example.com/v1/webhooks/payments".to_string(),
            return_deeplink: None,
            payment_option: default_payment_option(),
            lifetime_minutes: 10,
            timeout_seconds: 30,
            tran_id_max_len: 20,
            webhook_secret: None,
        }
    }
}
