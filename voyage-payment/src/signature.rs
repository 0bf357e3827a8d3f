use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use voyage_core::ReservationError;

type HmacSha512 = Hmac<Sha512>;
type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Concatenate field values in order and strip all whitespace. This exact
/// string is what gets hashed, and what gets logged when the provider
/// refuses a request.
pub fn canonical_string<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|v| v.chars())
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// base64(HMAC-SHA512(key, canonical)).
pub fn sign_request(canonical: &str, api_key: &str) -> Result<String, ReservationError> {
    let mut mac = HmacSha512::new_from_slice(api_key.as_bytes())
        .map_err(|e| ReservationError::Validation(format!("invalid signing key: {}", e)))?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// base64(HMAC-SHA256(secret, raw body)).
pub fn sign_webhook_body(body: &[u8], secret: &str) -> Result<String, ReservationError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ReservationError::Validation(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a webhook signature against the unparsed body in constant time.
pub fn verify_webhook(body: &[u8], signature: Option<&str>, secret: &str) -> bool {
    let Some(provided) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    match sign_webhook_body(body, secret) {
        Ok(expected) => constant_time_eq::constant_time_eq(expected.as_bytes(), provided.as_bytes()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_string_strips_whitespace() {
        let s = canonical_string(["20240101120000", " ec000002 ", "BK 1", "12.50\n"]);
        assert_eq!(s, "20240101120000ec000002BK112.50");
    }

    #[test]
    fn test_request_signature_fixture() {
        let sig = sign_request("20240101120000ec000002BK1A2B3C4D", "test-api-key").unwrap();
        assert_eq!(sig, REQUEST_FIXTURE);
    }

    #[test]
    fn test_webhook_signature_fixture() {
        let body = br#"{"tran_id":"BK1A2B3C4DXYZ9876543","status":"0"}"#;
        assert_eq!(sign_webhook_body(body, "whsec").unwrap(), WEBHOOK_FIXTURE);
        assert!(verify_webhook(body, Some(WEBHOOK_FIXTURE), "whsec"));
    }

    #[test]
    fn test_webhook_rejects_missing_or_tampered() {
        let body = br#"{"tran_id":"BK1A2B3C4DXYZ9876543","status":"0"}"#;
        assert!(!verify_webhook(body, None, "whsec"));
        assert!(!verify_webhook(body, Some(""), "whsec"));
        assert!(!verify_webhook(body, Some(WEBHOOK_FIXTURE), "other-secret"));

        let tampered = br#"{"tran_id":"BK1A2B3C4DXYZ9876543","status":"00"}"#;
        assert!(!verify_webhook(tampered, Some(WEBHOOK_FIXTURE), "whsec"));
    }

    const REQUEST_FIXTURE: &str = "bgPw4hGqFRJs8CX1dxLKZpIh6bI3ysADHG0wCuFUFyTvwsGX2zJsu4FHbZgXZ5FC7h3nqX0vvWh08HiNhrCSvg==";
    const WEBHOOK_FIXTURE: &str = "/vuVm2rPA4MthvA7AdNJaHpty0+q7OlGoDX1TpT6TrA=";
}
