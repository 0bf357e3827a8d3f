//! Pulls the transaction id and payment status out of provider payloads whose
//! shape changes between provider versions. Each key path is one extractor;
//! the first that finds something wins.

use serde_json::Value;
use voyage_core::ReservationError;
use voyage_payment::response::{is_ok_code, status_message, value_as_code};

type Extractor = fn(&Value) -> Option<String>;

fn at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |v, key| v.get(*key))
}

fn code_at(payload: &Value, path: &[&str]) -> Option<String> {
    at(payload, path).and_then(value_as_code)
}

fn first_match(payload: &Value, chain: &[Extractor]) -> Option<String> {
    chain.iter().find_map(|extract| extract(payload))
}

fn top_tran_id(p: &Value) -> Option<String> { code_at(p, &["tran_id"]) }
fn data_tran_id(p: &Value) -> Option<String> { code_at(p, &["data", "tran_id"]) }
fn status_tran_id(p: &Value) -> Option<String> { code_at(p, &["status", "tran_id"]) }
fn top_transaction_id(p: &Value) -> Option<String> { code_at(p, &["transaction_id"]) }
fn data_transaction_id(p: &Value) -> Option<String> { code_at(p, &["data", "transaction_id"]) }

const TRAN_ID_CHAIN: [Extractor; 5] = [
    top_tran_id,
    data_tran_id,
    status_tran_id,
    top_transaction_id,
    data_transaction_id,
];

fn data_payment_status_code(p: &Value) -> Option<String> { code_at(p, &["data", "payment_status_code"]) }
fn nested_status_code(p: &Value) -> Option<String> { code_at(p, &["status", "code"]) }
fn top_payment_status_code(p: &Value) -> Option<String> { code_at(p, &["payment_status_code"]) }
fn flat_status(p: &Value) -> Option<String> { code_at(p, &["status"]) }
fn data_payment_status(p: &Value) -> Option<String> { code_at(p, &["data", "payment_status"]) }

// Payment status first, then request status. `status.code` on a check
// response describes the query, so it only counts when no payment code exists.
const STATUS_CHAIN: [Extractor; 5] = [
    data_payment_status_code,
    nested_status_code,
    top_payment_status_code,
    flat_status,
    data_payment_status,
];

pub fn extract_tran_id(payload: &Value) -> Option<String> {
    first_match(payload, &TRAN_ID_CHAIN)
}

pub fn extract_status(payload: &Value) -> Option<String> {
    first_match(payload, &STATUS_CHAIN)
}

/// A check response in which the provider refused the query itself: a
/// non-zero request `status.code` and no payment status at all. Such a
/// response says nothing about the payment.
pub fn query_rejection(payload: &Value) -> Option<ReservationError> {
    if data_payment_status_code(payload).is_some() || data_payment_status(payload).is_some() {
        return None;
    }
    let code = nested_status_code(payload)?;
    if is_ok_code(&code) {
        return None;
    }
    Some(ReservationError::GatewayRejected {
        code,
        message: status_message(payload),
    })
}

/// What a provider status means for our payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOutcome {
    Approved,
    Pending,
    Declined,
}

pub fn classify(code: &str) -> ProviderOutcome {
    match code.trim().to_ascii_uppercase().as_str() {
        "0" | "00" | "APPROVED" | "SUCCESS" | "PAID" => ProviderOutcome::Approved,
        "3" | "4" | "7" | "DECLINED" | "FAILED" | "REJECTED" | "CANCELLED" | "CANCELED"
        | "REFUNDED" | "EXPIRED" => ProviderOutcome::Declined,
        // Unknown codes never fail a payment; a later event or poll decides.
        _ => ProviderOutcome::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tran_id_at_any_depth() {
        assert_eq!(extract_tran_id(&json!({"tran_id": "A1"})).as_deref(), Some("A1"));
        assert_eq!(extract_tran_id(&json!({"data": {"tran_id": "B2"}})).as_deref(), Some("B2"));
        assert_eq!(extract_tran_id(&json!({"status": {"tran_id": "C3"}})).as_deref(), Some("C3"));
        assert_eq!(extract_tran_id(&json!({"data": {"transaction_id": "D4"}})).as_deref(), Some("D4"));
        assert_eq!(extract_tran_id(&json!({"tran_id": "", "data": {"tran_id": "E5"}})).as_deref(), Some("E5"));
        assert_eq!(extract_tran_id(&json!({"status": 0})), None);
    }

    #[test]
    fn test_payment_code_beats_request_code() {
        let check = json!({
            "data": { "payment_status_code": 3, "payment_status": "DECLINED" },
            "status": { "code": "00", "message": "Success!" }
        });
        assert_eq!(extract_status(&check).as_deref(), Some("3"));
        assert_eq!(classify("3"), ProviderOutcome::Declined);
    }

    #[test]
    fn test_nested_status_code_without_payment_code() {
        let payload = json!({ "tran_id": "BK1", "status": { "code": "00" } });
        let code = extract_status(&payload).unwrap();
        assert_eq!(classify(&code), ProviderOutcome::Approved);
    }

    #[test]
    fn test_flat_numeric_status() {
        let payload = json!({ "tran_id": "BK1", "apv": "123456", "status": 0 });
        assert_eq!(extract_status(&payload).as_deref(), Some("0"));
    }

    #[test]
    fn test_textual_payment_status_is_last_resort() {
        let payload = json!({ "data": { "payment_status": "approved" } });
        assert_eq!(classify(&extract_status(&payload).unwrap()), ProviderOutcome::Approved);
        assert_eq!(classify("pending"), ProviderOutcome::Pending);
        assert_eq!(classify("REFUNDED"), ProviderOutcome::Declined);
    }

    #[test]
    fn test_unknown_codes_stay_pending() {
        assert_eq!(classify("6"), ProviderOutcome::Pending);
        assert_eq!(classify("99"), ProviderOutcome::Pending);
        assert_eq!(classify("SOMETHING_NEW"), ProviderOutcome::Pending);
    }

    #[test]
    fn test_refused_query_is_a_rejection() {
        let refused = json!({ "status": { "code": "6", "message": "Transaction not found" } });
        match query_rejection(&refused) {
            Some(ReservationError::GatewayRejected { code, message }) => {
                assert_eq!(code, "6");
                assert_eq!(message, "Transaction not found");
            }
            other => panic!("expected a rejection, got {:?}", other),
        }

        let answered = json!({ "data": { "payment_status_code": 3 }, "status": { "code": "00" } });
        assert!(query_rejection(&answered).is_none());
        let declined_with_data = json!({ "data": { "payment_status": "DECLINED" }, "status": { "code": "6" } });
        assert!(query_rejection(&declined_with_data).is_none());
        assert!(query_rejection(&json!({ "tran_id": "BK1", "status": 3 })).is_none());
    }
}
