use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ReservationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Cambodian riel, settled without minor units.
    Khr,
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Khr => "KHR",
            Currency::Usd => "USD",
        }
    }

    /// Number of decimal digits the provider expects for this currency.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Khr => 0,
            Currency::Usd => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KHR" => Ok(Currency::Khr),
            "USD" => Ok(Currency::Usd),
            other => Err(ReservationError::Validation(format!("unsupported currency: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ReservationError::Storage(format!("unknown payment status: {}", other))),
        }
    }
}

/// Which request shape the gateway sends. Chosen by configuration, never by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Scannable code and deeplink, no chargeable transaction registered up front.
    Qr,
    /// Registers a chargeable transaction the provider calls back about.
    Purchase,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Qr => "qr",
            PaymentMode::Purchase => "purchase",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qr" => Ok(PaymentMode::Qr),
            "purchase" => Ok(PaymentMode::Purchase),
            other => Err(ReservationError::Storage(format!("unknown payment mode: {}", other))),
        }
    }
}

/// One payment attempt for a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Provider-facing transaction id; unique and never reused.
    pub tran_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub mode: PaymentMode,
    pub payable_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new_pending(
        booking_id: Uuid,
        tran_id: String,
        amount: Decimal,
        currency: Currency,
        mode: PaymentMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            tran_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            mode,
            payable_reference: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PayerInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// What the gateway needs to register or render a payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRequest {
    pub tran_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub items: Vec<LineItem>,
    pub payer: PayerInfo,
}

/// Normalised view of an initiation response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayResponse {
    pub success: bool,
    /// QR string, deeplink or checkout URL the customer pays with.
    pub payable_reference: Option<String>,
    pub deeplink: Option<String>,
    /// Amount exactly as it was signed and sent.
    pub amount: String,
    pub currency: Currency,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The request shape this gateway is configured for.
    fn mode(&self) -> PaymentMode;

    /// Compose a transaction id no longer than the provider accepts.
    fn compose_tran_id(&self, prefix: &str) -> Result<String, ReservationError>;

    /// Register (purchase) or render (qr) a payment with the provider.
    async fn initiate(&self, request: &PaymentRequest) -> Result<GatewayResponse, ReservationError>;

    /// Fetch the provider's current view of a transaction, unparsed.
    async fn check_transaction(&self, tran_id: &str) -> Result<serde_json::Value, ReservationError>;
}
