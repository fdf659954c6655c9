use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use coachline_api::{app, AppState, Dependencies};
use coachline_core::clock::ManualClock;
use coachline_core::events::RecordingPublisher;
use coachline_payment::{signing, HttpRefundClient};
use coachline_shared::models::events::topics;
use coachline_shared::{PaymentStatus, Seat, SeatStatus, SegmentPrice, Trip, TripStatus};
use coachline_store::app_config::{BusinessRules, VnpayConfig};
use coachline_store::MemoryStore;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWT_SECRET: &str = "test-jwt-secret";
const HASH_SECRET: &str = "TESTSECRET";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    events: Arc<RecordingPublisher>,
    trip: Trip,
}

fn vnpay() -> VnpayConfig {
    VnpayConfig {
        tmn_code: "COACH01".to_string(),
        hash_secret: HASH_SECRET.into(),
        pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
        return_url: "https://coachline.test/payment/return".to_string(),
        api_url: "http://127.0.0.1:9/refund".to_string(),
        version: "2.1.0".to_string(),
        locale: "vn".to_string(),
        currency: "VND".to_string(),
        order_type: "other".to_string(),
    }
}

async fn test_app() -> TestApp {
    test_app_with_refunds("http://127.0.0.1:9/refund").await
}

async fn test_app_with_refunds(refund_url: &str) -> TestApp {
    let now = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(RecordingPublisher::new());

    let trip = Trip {
        id: uuid::Uuid::new_v4(),
        provider_id: "provider-1".to_string(),
        status: TripStatus::Scheduled,
        departure_time: now + Duration::days(3),
        stop_order: vec!["HN".to_string(), "NB".to_string(), "TH".to_string(), "VINH".to_string()],
        prices: vec![
            SegmentPrice { origin_stop: "HN".into(), destination_stop: "NB".into(), price: 50_000 },
            SegmentPrice { origin_stop: "HN".into(), destination_stop: "TH".into(), price: 100_000 },
            SegmentPrice { origin_stop: "HN".into(), destination_stop: "VINH".into(), price: 200_000 },
            SegmentPrice { origin_stop: "NB".into(), destination_stop: "TH".into(), price: 50_000 },
            SegmentPrice { origin_stop: "NB".into(), destination_stop: "VINH".into(), price: 150_000 },
            SegmentPrice { origin_stop: "TH".into(), destination_stop: "VINH".into(), price: 100_000 },
        ],
    };
    store.insert_trip(trip.clone()).await;

    let state = AppState::new(
        Dependencies {
            store: store.clone(),
            clock: Arc::new(ManualClock::new(now)),
            events: events.clone(),
            refunds: Arc::new(HttpRefundClient::new(refund_url).unwrap()),
            redis: None,
        },
        BusinessRules::default(),
        vnpay(),
        JWT_SECRET.into(),
    );

    TestApp {
        router: app(state),
        store,
        events,
        trip,
    }
}

fn token(sub: &str, role: &str) -> String {
    let claims = json!({
        "sub": sub,
        "role": role,
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

impl TestApp {
    async fn seat(&self, number: &str) -> Seat {
        let seat = Seat::new(self.trip.id, number);
        self.store.insert_seat(seat.clone()).await;
        seat
    }

    async fn send(&self, method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            builder = builder.header("Authorization", format!("Bearer {}", t));
        }
        let request = match body {
            Some(b) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Locks, confirms and settles one bank-transfer seat HN -> TH; returns the booking id.
    async fn paid_booking(&self, number: &str, bearer: &str) -> String {
        let seat = self.seat(number).await;
        self.send("POST", "/v1/tickets/lock", Some(bearer), Some(json!({ "seat_id": seat.id })))
            .await;
        let (_, booking) = self
            .send(
                "POST",
                "/v1/bookings/confirm",
                Some(bearer),
                Some(json!({
                    "seat_ids": [seat.id],
                    "origin_stop": "HN",
                    "destination_stop": "TH",
                    "payment_method": "bank_transfer",
                })),
            )
            .await;
        let id = booking["id"].as_str().unwrap().to_string();
        self.send(
            "POST",
            "/v1/payments/create-payment-url",
            Some(bearer),
            Some(json!({ "booking_id": id })),
        )
        .await;
        let uri = format!("/v1/payments/vnpay_ipn?{}", ipn_query(&id, 100_000, "00"));
        let (_, body) = self.send("GET", &uri, None, None).await;
        assert_eq!(body["RspCode"], "00");
        id
    }
}

fn ipn_query(booking_id: &str, amount: i64, code: &str) -> String {
    let mut params: BTreeMap<String, String> = BTreeMap::new();
    params.insert("vnp_TmnCode".into(), "COACH01".into());
    params.insert("vnp_TxnRef".into(), booking_id.into());
    params.insert("vnp_Amount".into(), (amount * 100).to_string());
    params.insert("vnp_ResponseCode".into(), code.into());
    params.insert("vnp_TransactionStatus".into(), code.into());
    params.insert("vnp_TransactionNo".into(), "14226112".into());
    params.insert("vnp_OrderInfo".into(), "Thanh toan ve xe".into());
    let (query, signature) = signing::sign(HASH_SECRET, &params).unwrap();
    format!("{}&{}={}", query, signing::SECURE_HASH, signature)
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ticket_routes_require_customer_token() {
    let app = test_app().await;
    let seat = app.seat("A1").await;
    let body = json!({ "seat_id": seat.id });

    let (status, _) = app.send("POST", "/v1/tickets/lock", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let provider = token("provider-1", "PROVIDER");
    let (status, _) = app.send("POST", "/v1/tickets/lock", Some(&provider), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_competing_locks_conflict() {
    let app = test_app().await;
    let seat = app.seat("A1").await;
    let alice = token("alice", "CUSTOMER");
    let bob = token("bob", "CUSTOMER");

    let (status, body) = app
        .send("POST", "/v1/tickets/lock", Some(&alice), Some(json!({ "seat_id": seat.id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "locked");

    let (status, body) = app
        .send("POST", "/v1/tickets/lock", Some(&bob), Some(json!({ "seat_id": seat.id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
    assert_eq!(body["seat_ids"][0], seat.id.to_string());

    let (status, body) = app
        .send("POST", "/v1/tickets/unlock", Some(&bob), Some(json!({ "seat_ids": [seat.id] })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"].as_array().unwrap().len(), 0);

    let (_, body) = app
        .send("POST", "/v1/tickets/unlock", Some(&alice), Some(json!({ "seat_ids": [seat.id] })))
        .await;
    assert_eq!(body["released"][0], seat.id.to_string());
}

#[tokio::test]
async fn test_cash_booking_approved_by_provider() {
    let app = test_app().await;
    let a = app.seat("A1").await;
    let b = app.seat("A2").await;
    let alice = token("alice", "CUSTOMER");

    let (status, _) = app
        .send(
            "POST",
            "/v1/tickets/lock-many",
            Some(&alice),
            Some(json!({
                "trip_id": app.trip.id,
                "seat_ids": [a.id, b.id],
                "origin_stop": "NB",
                "destination_stop": "VINH",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, booking) = app
        .send(
            "POST",
            "/v1/bookings/confirm",
            Some(&alice),
            Some(json!({
                "seat_ids": [a.id, b.id],
                "origin_stop": "NB",
                "destination_stop": "VINH",
                "payment_method": "cash",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["total_price"], 300_000);
    assert_eq!(booking["approval_status"], "pending_approval");
    let id = booking["id"].as_str().unwrap().to_string();

    let other = token("provider-2", "PROVIDER");
    let (status, _) = app
        .send("PATCH", &format!("/v1/bookings/{}/approve", id), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let provider = token("provider-1", "PROVIDER");
    let (status, approved) = app
        .send("PATCH", &format!("/v1/bookings/{}/approve", id), Some(&provider), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["approval_status"], "confirmed_by_provider");
    assert_eq!(approved["payment_status"], "pending");

    for seat in [a.id, b.id] {
        assert_eq!(app.store.seat(seat).await.unwrap().status, SeatStatus::Booked);
    }
    assert_eq!(
        app.events.topics(),
        vec![
            topics::SEATS_LOCKED.to_string(),
            topics::BOOKING_CONFIRMED.to_string(),
            topics::BOOKING_APPROVED.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_bank_transfer_paid_through_ipn() {
    let app = test_app().await;
    let seat = app.seat("B1").await;
    let alice = token("alice", "CUSTOMER");

    app.send("POST", "/v1/tickets/lock", Some(&alice), Some(json!({ "seat_id": seat.id })))
        .await;
    let (_, booking) = app
        .send(
            "POST",
            "/v1/bookings/confirm",
            Some(&alice),
            Some(json!({
                "seat_ids": [seat.id],
                "origin_stop": "HN",
                "destination_stop": "TH",
                "payment_method": "bank_transfer",
            })),
        )
        .await;
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            "POST",
            "/v1/payments/create-payment-url",
            Some(&alice),
            Some(json!({ "booking_id": id, "bank_code": "NCB" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["payment_url"].as_str().unwrap().contains("vnp_Amount=10000000"));

    let mut tampered = ipn_query(&id, 100_000, "00");
    tampered.push_str("&vnp_BankCode=NCB");
    let (status, body) = app.send("GET", &format!("/v1/payments/vnpay_ipn?{}", tampered), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["RspCode"], "97");

    let uri = format!("/v1/payments/vnpay_ipn?{}", ipn_query(&id, 100_000, "00"));
    let (status, body) = app.send("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["RspCode"], "00");
    assert_eq!(app.store.seat(seat.id).await.unwrap().status, SeatStatus::Booked);

    let (_, body) = app.send("GET", &uri, None, None).await;
    assert_eq!(body["RspCode"], "02");

    let (status, view) = app
        .send("GET", &format!("/v1/bookings/{}/payment-status", id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["payment_status"], "completed");
    assert_eq!(view["transaction_id"], "14226112");

    let (_, check) = app
        .send("GET", &format!("/v1/bookings/{}/refundable", id), Some(&alice), None)
        .await;
    assert_eq!(check["refundable"], true);

    let stored = app.store.booking(id.parse().unwrap()).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_return_is_read_only() {
    let app = test_app().await;
    let seat = app.seat("C1").await;
    let alice = token("alice", "CUSTOMER");

    app.send("POST", "/v1/tickets/lock", Some(&alice), Some(json!({ "seat_id": seat.id })))
        .await;
    let (_, booking) = app
        .send(
            "POST",
            "/v1/bookings/confirm",
            Some(&alice),
            Some(json!({
                "seat_ids": [seat.id],
                "origin_stop": "HN",
                "destination_stop": "NB",
                "payment_method": "bank_transfer",
            })),
        )
        .await;
    let id = booking["id"].as_str().unwrap().to_string();

    let uri = format!("/v1/payments/vnpay_return?{}", ipn_query(&id, 50_000, "00"));
    let (status, body) = app.send("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let stored = app.store.booking(id.parse().unwrap()).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(app.store.seat(seat.id).await.unwrap().status, SeatStatus::PendingApproval);
}

#[tokio::test]
async fn test_refund_declines_do_not_open_breaker() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vnp_ResponseCode": "94",
            "vnp_Message": "Duplicate refund request",
        })))
        .mount(&gateway)
        .await;
    let app = test_app_with_refunds(&gateway.uri()).await;

    let mut statuses = Vec::new();
    for i in 0..6 {
        let customer = token(&format!("customer-{}", i), "CUSTOMER");
        let id = app.paid_booking(&format!("R{}", i), &customer).await;
        let (status, body) = app
            .send("POST", "/v1/payments/refund", Some(&customer), Some(json!({ "booking_id": id })))
            .await;
        assert_eq!(body["kind"], "conflict");
        statuses.push(status);
    }
    assert_eq!(statuses, vec![StatusCode::CONFLICT; 6]);
}

#[tokio::test]
async fn test_unreachable_gateway_opens_breaker() {
    let app = test_app().await;

    let mut statuses = Vec::new();
    let mut ids = Vec::new();
    for i in 0..6 {
        let customer = token(&format!("customer-{}", i), "CUSTOMER");
        let id = app.paid_booking(&format!("U{}", i), &customer).await;
        let (status, _) = app
            .send("POST", "/v1/payments/refund", Some(&customer), Some(json!({ "booking_id": id })))
            .await;
        statuses.push(status);
        ids.push(id);
    }
    assert_eq!(&statuses[..5], &[StatusCode::BAD_GATEWAY; 5]);
    assert_eq!(statuses[5], StatusCode::SERVICE_UNAVAILABLE);

    let stored = app.store.booking(ids[5].parse().unwrap()).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Completed);
}
