use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;
use voyage_api::middleware::{CustomerClaims, RateLimiter};
use voyage_api::webhooks::SIGNATURE_HEADER;
use voyage_api::{app, AppState, AuthConfig, Services};
use voyage_core::repository::{LogNotifier, ReservationStore};
use voyage_core::{BookingStatus, Currency, PaymentMode, UnitRef};
use voyage_payment::mock::{MockBehavior, MockPaymentGateway};
use voyage_payment::signature::sign_webhook_body;
use voyage_shared::Masked;
use voyage_store::app_config::BusinessRules;
use voyage_store::{MemoryStore, StaticCatalog};

const JWT_SECRET: &str = "test-jwt-secret";
const WEBHOOK_SECRET: &str = "test-webhook-secret";

struct Harness {
    app: Router,
    store: MemoryStore,
    gateway: Arc<MockPaymentGateway>,
    seats: Vec<UnitRef>,
}

/// In-process fixed window that never resets.
#[derive(Default)]
struct CountingLimiter {
    counts: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl RateLimiter for CountingLimiter {
    async fn allow(&self, key: &str, limit: i64, _window_seconds: i64) -> anyhow::Result<bool> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count <= limit)
    }
}

fn setup() -> Harness {
    setup_with(None, BusinessRules::default())
}

fn setup_with(rate_limiter: Option<Arc<dyn RateLimiter>>, business_rules: BusinessRules) -> Harness {
    let schedule_id = Uuid::new_v4();
    let seats: Vec<UnitRef> = (0..3)
        .map(|_| UnitRef::Seat { schedule_id, seat_id: Uuid::new_v4() })
        .collect();
    let catalog = seats.iter().fold(StaticCatalog::new(), |c, s| {
        c.with_seat(s.unit_id(), Decimal::new(15000, 0), Currency::Khr)
    });

    let store = MemoryStore::new();
    let gateway = Arc::new(MockPaymentGateway::new(PaymentMode::Qr));
    let state = AppState::new(
        Services {
            store: Arc::new(store.clone()),
            catalog: Arc::new(catalog),
            gateway: gateway.clone(),
            notifier: Arc::new(LogNotifier),
            webhook_secret: Some(Masked::new(WEBHOOK_SECRET.to_string())),
        },
        rate_limiter,
        AuthConfig { secret: Masked::new(JWT_SECRET.to_string()) },
        business_rules,
    );

    Harness { app: app(state), store, gateway, seats }
}

fn token(sub: &str) -> String {
    let claims = CustomerClaims {
        sub: sub.to_string(),
        email: None,
        role: "CUSTOMER".to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authed(method: &str, uri: &str, sub: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token(sub)))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook(body: &Value, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed(body: &Value) -> String {
    sign_webhook_body(body.to_string().as_bytes(), WEBHOOK_SECRET).unwrap()
}

async fn book(h: &Harness, sub: &str, units: &[UnitRef]) -> (StatusCode, Value) {
    send(&h.app, authed("POST", "/v1/bookings", sub, json!({ "items": units }))).await
}

async fn book_and_pay(h: &Harness, sub: &str) -> (Uuid, String) {
    let (status, booking) = book(h, sub, &h.seats[..1]).await;
    assert_eq!(status, StatusCode::CREATED);
    let booking_id: Uuid = booking["id"].as_str().unwrap().parse().unwrap();

    let uri = format!("/v1/bookings/{}/payments", booking_id);
    let (status, payment) = send(&h.app, authed("POST", &uri, sub, json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    (booking_id, payment["tran_id"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_booking_requires_a_customer_token() {
    let h = setup();
    let req = Request::builder()
        .method("POST")
        .uri("/v1/bookings")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "items": h.seats }).to_string()))
        .unwrap();

    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_read_booking() {
    let h = setup();
    let (status, created) = book(&h, "customer-1", &h.seats[..2]).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["total_amount"], "30000");
    assert_eq!(created["currency"], "KHR");
    assert_eq!(created["items"].as_array().unwrap().len(), 2);
    assert_eq!(created["items"][0]["kind"], "seat");

    let uri = format!("/v1/bookings/{}", created["id"].as_str().unwrap());
    let (status, fetched) = send(&h.app, authed("GET", &uri, "customer-1", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], created["id"]);

    let (status, _) = send(&h.app, authed("GET", &uri, "customer-2", Value::Null)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_taken_seat_is_reported_back() {
    let h = setup();
    let (status, _) = book(&h, "customer-1", &h.seats[..1]).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = book(&h, "customer-2", &h.seats[..2]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let unavailable = body["unavailable_units"].as_array().unwrap();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0]["seat_id"], h.seats[0].unit_id().to_string());

    // The free seat was not left held by the rejected request.
    let (status, _) = book(&h, "customer-3", &h.seats[1..2]).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_empty_booking_is_rejected() {
    let h = setup();
    let (status, _) = book(&h, "customer-1", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_initiation_returns_payable_reference() {
    let h = setup();
    let (_, booking) = book(&h, "customer-1", &h.seats[..1]).await;
    let uri = format!("/v1/bookings/{}/payments", booking["id"].as_str().unwrap());

    let (status, body) = send(&h.app, authed("POST", &uri, "customer-1", json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["mode"], "qr");
    assert_eq!(body["amount"], "15000");
    let tran_id = body["tran_id"].as_str().unwrap();
    assert_eq!(body["payable_reference"], format!("mock-qr-{}", tran_id));

    let (status, _) = send(&h.app, authed("POST", &uri, "customer-2", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_provider_rejection_is_payment_required() {
    let h = setup();
    h.gateway.set_behavior(MockBehavior::Reject {
        code: "4".to_string(),
        message: "Merchant is not active".to_string(),
    });
    let (_, booking) = book(&h, "customer-1", &h.seats[..1]).await;
    let uri = format!("/v1/bookings/{}/payments", booking["id"].as_str().unwrap());

    let (status, body) = send(&h.app, authed("POST", &uri, "customer-1", json!({}))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Merchant is not active");
    assert_eq!(body["provider_code"], "4");
}

#[tokio::test]
async fn test_signed_webhook_settles_booking() {
    let h = setup();
    let (booking_id, tran_id) = book_and_pay(&h, "customer-1").await;

    let payload = json!({ "tran_id": tran_id, "status": { "code": "00", "message": "Success!" } });
    let (status, body) = send(&h.app, webhook(&payload, Some(&signed(&payload)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "success");
    assert_eq!(body["booking_id"], booking_id.to_string());

    let booking = h.store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Paid);

    // Redelivery is acknowledged without changing anything.
    let (status, body) = send(&h.app, webhook(&payload, Some(&signed(&payload)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "success");
    assert_eq!(h.store.confirmations(), 1);
}

#[tokio::test]
async fn test_webhook_signature_travels_in_its_documented_header() {
    let h = setup();
    let (booking_id, tran_id) = book_and_pay(&h, "customer-1").await;

    let payload = json!({ "tran_id": tran_id, "status": 0 });
    let req = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header("content-type", "application/json")
        .header("x-webhook-signature", signed(&payload))
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "success");
    assert_eq!(
        h.store.get_booking(booking_id).await.unwrap().unwrap().status,
        BookingStatus::Paid
    );
}

#[tokio::test]
async fn test_rate_limit_spares_provider_webhooks() {
    let rules = BusinessRules { rate_limit_per_minute: 2, ..BusinessRules::default() };
    let h = setup_with(Some(Arc::new(CountingLimiter::default())), rules);
    let (booking_id, tran_id) = book_and_pay(&h, "customer-1").await;

    let uri = format!("/v1/bookings/{}", booking_id);
    let (status, _) = send(&h.app, authed("GET", &uri, "customer-1", Value::Null)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let payload = json!({ "tran_id": tran_id, "status": { "code": "00", "message": "Success!" } });
    for _ in 0..3 {
        let (status, body) = send(&h.app, webhook(&payload, Some(&signed(&payload)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment_status"], "success");
    }
    assert_eq!(h.store.confirmations(), 1);

    let (status, _) = send(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forged_webhook_is_unauthorized() {
    let h = setup();
    let (booking_id, tran_id) = book_and_pay(&h, "customer-1").await;

    let payload = json!({ "tran_id": tran_id, "status": 0 });
    let forged = signed(&json!({ "tran_id": tran_id, "status": 3 }));
    let (status, _) = send(&h.app, webhook(&payload, Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, webhook(&payload, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let booking = h.store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_webhook_for_unknown_or_missing_transaction() {
    let h = setup();

    let unknown = json!({ "tran_id": "BK00000000NOPE", "status": 0 });
    let (status, _) = send(&h.app, webhook(&unknown, Some(&signed(&unknown)))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let anonymous = json!({ "status": 0 });
    let (status, _) = send(&h.app, webhook(&anonymous, Some(&signed(&anonymous)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_check_applies_provider_view() {
    let h = setup();
    let (booking_id, tran_id) = book_and_pay(&h, "customer-1").await;
    let uri = format!("/v1/payments/{}/check", tran_id);

    let (status, body) = send(&h.app, authed("POST", &uri, "customer-1", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "no_op");
    assert_eq!(body["payment_status"], "pending");

    h.gateway.set_transaction_status(
        &tran_id,
        json!({ "data": { "payment_status_code": 0, "payment_status": "APPROVED" }, "status": { "code": "00" } }),
    );
    let (status, body) = send(&h.app, authed("POST", &uri, "customer-1", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "applied");
    assert_eq!(body["payment_status"], "success");
    assert_eq!(
        h.store.get_booking(booking_id).await.unwrap().unwrap().status,
        BookingStatus::Paid
    );

    let (status, _) = send(&h.app, authed("POST", &uri, "customer-2", Value::Null)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
