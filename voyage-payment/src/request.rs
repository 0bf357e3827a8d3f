use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use voyage_core::payment::{LineItem, PaymentRequest};
use voyage_core::{Currency, PaymentMode, ReservationError};

use crate::amount::format_amount;
use crate::config::GatewayConfig;
use crate::signature::{canonical_string, sign_request};

const QR_IMAGE_TEMPLATE: &str = "template3_color";

/// A request ready to send: ordered fields, the exact pre-signature string, and its hash.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub fields: Vec<(&'static str, String)>,
    pub canonical: String,
    pub hash: String,
}

impl SignedRequest {
    fn sign(fields: Vec<(&'static str, String)>, api_key: &str) -> Result<Self, ReservationError> {
        let canonical = canonical_string(fields.iter().map(|(_, v)| v.as_str()));
        let hash = sign_request(&canonical, api_key)?;
        Ok(Self { fields, canonical, hash })
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Body for form-encoded endpoints.
    pub fn form(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .chain(std::iter::once(("hash", self.hash.as_str())))
            .collect()
    }

    /// Body for JSON endpoints.
    pub fn json(&self) -> Value {
        let mut body = Map::new();
        for (k, v) in &self.fields {
            body.insert((*k).to_string(), Value::String(v.clone()));
        }
        body.insert("hash".to_string(), Value::String(self.hash.clone()));
        Value::Object(body)
    }
}

/// Provider request timestamp, UTC `YYYYmmddHHMMSS`.
pub fn request_time(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Build and sign the initiation request for the configured mode.
pub fn build_payment_request(
    config: &GatewayConfig,
    request: &PaymentRequest,
    req_time: &str,
) -> Result<SignedRequest, ReservationError> {
    let fields = match config.mode {
        PaymentMode::Purchase => purchase_fields(config, request, req_time)?,
        PaymentMode::Qr => qr_fields(config, request, req_time)?,
    };
    SignedRequest::sign(fields, config.api_key.expose())
}

/// Build and sign a transaction status query.
pub fn build_check_request(
    config: &GatewayConfig,
    tran_id: &str,
    req_time: &str,
) -> Result<SignedRequest, ReservationError> {
    let fields = vec![
        ("req_time", req_time.to_string()),
        ("merchant_id", config.merchant_id.clone()),
        ("tran_id", tran_id.to_string()),
    ];
    SignedRequest::sign(fields, config.api_key.expose())
}

// The provider hashes these in exactly this order. Do not reorder.
fn purchase_fields(
    config: &GatewayConfig,
    request: &PaymentRequest,
    req_time: &str,
) -> Result<Vec<(&'static str, String)>, ReservationError> {
    Ok(vec![
        ("req_time", req_time.to_string()),
        ("merchant_id", config.merchant_id.clone()),
        ("tran_id", request.tran_id.clone()),
        ("amount", format_amount(request.amount, request.currency)?),
        ("items", encode_items(&request.items, request.currency)?),
        ("shipping", String::new()),
        ("firstname", request.payer.first_name.clone()),
        ("lastname", request.payer.last_name.clone()),
        ("email", request.payer.email.clone()),
        ("phone", request.payer.phone.clone()),
        ("type", "purchase".to_string()),
        ("payment_option", config.payment_option.clone()),
        ("return_url", STANDARD.encode(&config.callback_url)),
        ("cancel_url", String::new()),
        ("continue_success_url", String::new()),
        ("return_deeplink", encode_optional(config.return_deeplink.as_deref())),
        ("currency", request.currency.code().to_string()),
        ("custom_fields", String::new()),
        ("return_params", String::new()),
        ("payout", String::new()),
        ("lifetime", config.lifetime_minutes.to_string()),
        ("additional_params", String::new()),
        ("google_pay_token", String::new()),
        ("skip_success_page", String::new()),
    ])
}

// QR generation has its own field names and order.
fn qr_fields(
    config: &GatewayConfig,
    request: &PaymentRequest,
    req_time: &str,
) -> Result<Vec<(&'static str, String)>, ReservationError> {
    Ok(vec![
        ("req_time", req_time.to_string()),
        ("merchant_id", config.merchant_id.clone()),
        ("tran_id", request.tran_id.clone()),
        ("amount", format_amount(request.amount, request.currency)?),
        ("items", encode_items(&request.items, request.currency)?),
        ("first_name", request.payer.first_name.clone()),
        ("last_name", request.payer.last_name.clone()),
        ("email", request.payer.email.clone()),
        ("phone", request.payer.phone.clone()),
        ("purchase_type", "purchase".to_string()),
        ("payment_option", config.payment_option.clone()),
        ("callback_url", STANDARD.encode(&config.callback_url)),
        ("return_deeplink", encode_optional(config.return_deeplink.as_deref())),
        ("currency", request.currency.code().to_string()),
        ("custom_fields", String::new()),
        ("return_params", String::new()),
        ("payout", String::new()),
        ("lifetime", config.lifetime_minutes.to_string()),
        ("qr_image_template", QR_IMAGE_TEMPLATE.to_string()),
    ])
}

#[derive(Serialize)]
struct ItemPayload<'a> {
    name: &'a str,
    quantity: i32,
    price: String,
}

/// base64 of the JSON item list, empty when there are no items.
fn encode_items(items: &[LineItem], currency: Currency) -> Result<String, ReservationError> {
    if items.is_empty() {
        return Ok(String::new());
    }
    let payload = items
        .iter()
        .map(|item| {
            Ok(ItemPayload {
                name: &item.name,
                quantity: item.quantity,
                price: format_amount(item.price, currency)?,
            })
        })
        .collect::<Result<Vec<_>, ReservationError>>()?;
    let json = serde_json::to_string(&payload)
        .map_err(|e| ReservationError::Validation(format!("cannot encode items: {}", e)))?;
    Ok(STANDARD.encode(json))
}

fn encode_optional(value: Option<&str>) -> String {
    value.map(|v| STANDARD.encode(v)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use voyage_core::payment::PayerInfo;

    fn request(amount: Decimal, currency: Currency) -> PaymentRequest {
        PaymentRequest {
            tran_id: "BK1A2B3C4DXYZ9876543".to_string(),
            amount,
            currency,
            items: vec![],
            payer: PayerInfo::default(),
        }
    }

    #[test]
    fn test_purchase_signature_matches_fixture() {
        let config = GatewayConfig::fixture(PaymentMode::Purchase);
        let signed = build_payment_request(&config, &request(Decimal::new(125, 1), Currency::Usd), "20240101120000").unwrap();

        assert_eq!(signed.canonical, PURCHASE_CANONICAL);
        assert_eq!(signed.hash, PURCHASE_HASH);
        assert_eq!(signed.field("amount"), Some("12.50"));
    }

    #[test]
    fn test_qr_signature_matches_fixture() {
        let config = GatewayConfig::fixture(PaymentMode::Qr);
        let signed = build_payment_request(&config, &request(Decimal::new(15000, 2), Currency::Khr), "20240101120000").unwrap();

        assert_eq!(signed.canonical, QR_CANONICAL);
        assert_eq!(signed.hash, QR_HASH);
        assert_eq!(signed.field("amount"), Some("150"));
        assert!(signed.field("callback_url").is_some());
        assert!(signed.field("return_url").is_none());
    }

    #[test]
    fn test_modes_sign_different_field_orders() {
        let purchase = build_payment_request(
            &GatewayConfig::fixture(PaymentMode::Purchase),
            &request(Decimal::new(500, 2), Currency::Usd),
            "20240101120000",
        )
        .unwrap();
        let qr = build_payment_request(
            &GatewayConfig::fixture(PaymentMode::Qr),
            &request(Decimal::new(500, 2), Currency::Usd),
            "20240101120000",
        )
        .unwrap();

        assert_ne!(purchase.hash, qr.hash);
        let names: Vec<&str> = purchase.fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(&names[..5], &["req_time", "merchant_id", "tran_id", "amount", "items"]);
    }

    #[test]
    fn test_whitespace_is_stripped_before_hashing() {
        let config = GatewayConfig::fixture(PaymentMode::Purchase);
        let mut req = request(Decimal::new(125, 1), Currency::Usd);
        req.payer.first_name = "Sok Dara".to_string();

        let signed = build_payment_request(&config, &req, "20240101120000").unwrap();
        assert!(!signed.canonical.contains(' '));
        assert!(signed.canonical.contains("SokDara"));
        assert_eq!(signed.field("firstname"), Some("Sok Dara"));
    }

    #[test]
    fn test_check_request_fixture() {
        let config = GatewayConfig::fixture(PaymentMode::Purchase);
        let signed = build_check_request(&config, "BK1A2B3C4DXYZ9876543", "20240101120000").unwrap();
        assert_eq!(signed.canonical, "20240101120000ec000002BK1A2B3C4DXYZ9876543");
        assert_eq!(signed.json()["hash"], signed.hash.as_str());
    }

    #[test]
    fn test_items_are_base64_json() {
        let items = vec![LineItem { name: "Seat 4A".to_string(), quantity: 1, price: Decimal::new(125, 1) }];
        let encoded = encode_items(&items, Currency::Usd).unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, r#"[{"name":"Seat 4A","quantity":1,"price":"12.50"}]"#);
    }

    #[test]
    fn test_request_time_format() {
        let now = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(request_time(now), "20240101120000");
    }

    const PURCHASE_CANONICAL: &str = "20240101120000ec000002BK1A2B3C4DXYZ987654312.50purchaseabapay_khqraHR0cHM6Ly9hcGkuZXhhbXBsZS5jb20vdjEvd2ViaG9va3MvcGF5bWVudHM=USD10";
    const PURCHASE_HASH: &str = "AS2q5B5B/fXjvgJ5zj2Tkcn8GLt6hrxfUDpMrYp3dr5obdq4ilLt9ufth9TkIZb1T9w0IKhmhoR5PpFkcsm7Zg==";
    const QR_CANONICAL: &str = "20240101120000ec000002BK1A2B3C4DXYZ9876543150purchaseabapay_khqraHR0cHM6Ly9hcGkuZXhhbXBsZS5jb20vdjEvd2ViaG9va3MvcGF5bWVudHM=KHR10template3_color";
    const QR_HASH: &str = "dh8OB/8xFPZUQrCR05H15B6buQ/3StGvx5PK1FqgUxPdKvqcT48XAlkiNRn0/j+ULkBWQXZo/b3vKoxOFZWkww==";
}
