use serde_json::Value;
use voyage_core::payment::GatewayResponse;
use voyage_core::{Currency, ReservationError};

/// Provider codes meaning "accepted".
const OK_CODES: [&str; 2] = ["0", "00"];

const REFERENCE_KEYS: [&str; 4] = ["qrString", "checkout_qr_url", "payment_url", "checkout_url"];
const DEEPLINK_KEYS: [&str; 2] = ["abapay_deeplink", "deeplink"];

/// Read a scalar as a trimmed string. Numbers are accepted because the provider
/// is not consistent about quoting codes.
pub fn value_as_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn is_ok_code(code: &str) -> bool {
    OK_CODES.contains(&code)
}

/// The provider's result code: nested `status.code`, a flat `status`, or `code`.
pub fn status_code(raw: &Value) -> Option<String> {
    raw.get("status")
        .and_then(|s| s.get("code"))
        .and_then(value_as_code)
        .or_else(|| raw.get("status").and_then(value_as_code))
        .or_else(|| raw.get("code").and_then(value_as_code))
}

/// The provider's explanation for `status_code`.
pub fn status_message(raw: &Value) -> String {
    raw.get("status")
        .and_then(|s| s.get("message"))
        .or_else(|| raw.get("description"))
        .or_else(|| raw.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}

fn first_string(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| raw.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalise a structurally valid (2xx, JSON) initiation response.
///
/// A non-zero provider code becomes `GatewayRejected` carrying the provider's message.
/// A response without any code is accepted only when it carries something to pay with.
pub fn parse_initiation(
    raw: Value,
    amount: String,
    currency: Currency,
) -> Result<GatewayResponse, ReservationError> {
    let payable_reference = first_string(&raw, &REFERENCE_KEYS);
    let deeplink = first_string(&raw, &DEEPLINK_KEYS);

    match status_code(&raw) {
        Some(code) if !is_ok_code(&code) => {
            return Err(ReservationError::GatewayRejected {
                code,
                message: status_message(&raw),
            })
        }
        None if payable_reference.is_none() && deeplink.is_none() => {
            return Err(ReservationError::GatewayRejected {
                code: "unknown".to_string(),
                message: "response carried neither a status nor a payable reference".to_string(),
            })
        }
        _ => {}
    }

    Ok(GatewayResponse {
        success: true,
        payable_reference: payable_reference.or_else(|| deeplink.clone()),
        deeplink,
        amount,
        currency,
        raw,
    })
}
