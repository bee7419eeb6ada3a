//! End-to-end over HTTP: request → outbox → forwarder → router → handlers
//!
//! Skipped when `DATABASE_URL` is not set.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{get_test_pool, reset, wait_until, Mocks};
use event_bus::consumer_retry::RetryConfig;
use event_bus::InMemoryBus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use tickets_rs::config::{BusType, Config, ForwarderConfig, RouterSettings};
use tickets_rs::handlers::SHEET_TICKETS_TO_PRINT;
use tickets_rs::handlers::SHEET_TICKETS_TO_REFUND;
use tickets_rs::repos::booking_repo::booked_tickets;
use tickets_rs::Service;

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        bus_type: BusType::InMemory,
        nats_url: String::new(),
        host: "127.0.0.1".to_string(),
        port: 0,
        gateway_url: "http://localhost:0".to_string(),
        forwarder: ForwarderConfig {
            poll_interval: Duration::from_millis(20),
            batch_size: 100,
        },
        router: RouterSettings {
            retry: RetryConfig {
                max_retries: 3,
                initial_interval: Duration::from_millis(1),
                multiplier: 2.0,
                max_interval: Duration::from_millis(5),
            },
            ..RouterSettings::default()
        },
        shutdown_grace: Duration::from_secs(5),
    }
}

struct Harness {
    pool: PgPool,
    mocks: Mocks,
    app: axum::Router,
    token: CancellationToken,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    async fn start(pool: PgPool) -> Self {
        let mocks = Mocks::default();
        let service = Service::new(
            test_config(),
            pool.clone(),
            Arc::new(InMemoryBus::new()),
            mocks.collaborators(),
        )
        .unwrap();
        let app = service.app();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(service.run_with_listener(listener, token.clone()));

        Self {
            pool,
            mocks,
            app,
            token,
            task,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let correlation = response
            .headers()
            .get("correlation-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body, correlation)
    }

    async fn stop(self) {
        self.token.cancel();
        self.task.await.unwrap().unwrap();
    }
}

fn json_request(method: &str, uri: &str, body: Value, idempotency_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn status_body(ticket_id: &str, status: &str) -> Value {
    json!({
        "tickets": [{
            "ticket_id": ticket_id,
            "status": status,
            "customer_email": "fan@example.com",
            "price": {"amount": "42.00", "currency": "GBP"}
        }]
    })
}

async fn outbox_count(pool: &PgPool, message_type: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM events_outbox WHERE message_type = $1")
        .bind(message_type)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn ticket_count(pool: &PgPool, ticket_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE ticket_id = $1")
        .bind(ticket_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn create_show(h: &Harness, number_of_tickets: i32) -> Uuid {
    let (status, body, _) = h
        .send(json_request(
            "POST",
            "/shows",
            json!({
                "external_show_id": Uuid::new_v4(),
                "number_of_tickets": number_of_tickets,
                "start_time": "2026-12-01T20:00:00Z",
                "title": "The Outbox Tour",
                "venue": "Main Hall"
            }),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["show_id"].as_str().unwrap().parse().unwrap()
}

async fn book(h: &Harness, show_id: Uuid, number_of_tickets: i32) -> StatusCode {
    let (status, _, _) = h
        .send(json_request(
            "POST",
            "/book-tickets",
            json!({
                "show_id": show_id,
                "number_of_tickets": number_of_tickets,
                "customer_email": "fan@example.com"
            }),
            None,
        ))
        .await;
    status
}

#[tokio::test]
#[serial]
async fn repeated_confirmation_request_has_one_effect_each() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    for _ in 0..3 {
        let (status, _, _) = h
            .send(json_request("POST", "/tickets-status", status_body("t-1", "confirmed"), Some("K1")))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(outbox_count(&pool, "TicketBookingConfirmed").await, 1);

    let mocks = h.mocks.clone();
    let handled = wait_until(Duration::from_secs(10), || {
        let mocks = mocks.clone();
        let pool = pool.clone();
        async move {
            mocks.receipts.issued().len() == 1
                && mocks.spreadsheets.rows(SHEET_TICKETS_TO_PRINT).len() == 1
                && ticket_count(&pool, "t-1").await == 1
        }
    })
    .await;
    assert!(handled, "confirmation was not handled");

    let receipt = &h.mocks.receipts.issued()[0];
    assert_eq!(receipt.idempotency_key, "K1t-1");
    assert_eq!(receipt.price.amount, "42.00");
    assert_eq!(receipt.price.currency, "GBP");

    let (status, body, _) = h
        .send(Request::get("/tickets").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["ticket_id"], "t-1");
    assert_eq!(body[0]["price"]["amount"], "42.00");
    assert_eq!(body[0]["price"]["currency"], "GBP");

    h.stop().await;
}

#[tokio::test]
#[serial]
async fn booking_beyond_capacity_is_rejected_and_not_stored() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    let show_id = create_show(&h, 10).await;
    assert_eq!(book(&h, show_id, 9).await, StatusCode::CREATED);
    assert_eq!(book(&h, show_id, 2).await, StatusCode::BAD_REQUEST);

    assert_eq!(booked_tickets(&pool, show_id).await.unwrap(), 9);
    assert_eq!(outbox_count(&pool, "BookingMade").await, 1);

    let mocks = h.mocks.clone();
    let booked_externally = wait_until(Duration::from_secs(10), || {
        let mocks = mocks.clone();
        async move { mocks.external_bookings.bookings().len() == 1 }
    })
    .await;
    assert!(booked_externally);
    assert_eq!(h.mocks.external_bookings.bookings()[0].1.number_of_tickets, 9);

    h.stop().await;
}

#[tokio::test]
#[serial]
async fn concurrent_bookings_never_exceed_capacity() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Arc::new(Harness::start(pool.clone()).await);

    let show_id = create_show(&h, 10).await;

    let mut requests = Vec::new();
    for _ in 0..5 {
        let h = Arc::clone(&h);
        requests.push(tokio::spawn(async move { book(&h, show_id, 3).await }));
    }

    let mut created = 0;
    for request in requests {
        let status = request.await.unwrap();
        match status {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}"),
        }
    }

    assert!((1..=3).contains(&created));
    assert_eq!(booked_tickets(&pool, show_id).await.unwrap(), 3 * created);
    assert_eq!(outbox_count(&pool, "BookingMade").await, created);

    let h = Arc::try_unwrap(h).ok().expect("harness still shared");
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn cancellation_removes_ticket_and_tracks_refund() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    h.send(json_request("POST", "/tickets-status", status_body("t-1", "confirmed"), Some("K1")))
        .await;
    let stored = wait_until(Duration::from_secs(10), || {
        let pool = pool.clone();
        async move { ticket_count(&pool, "t-1").await == 1 }
    })
    .await;
    assert!(stored);

    let (status, _, _) = h
        .send(json_request("POST", "/tickets-status", status_body("t-1", "canceled"), Some("K2")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let mocks = h.mocks.clone();
    let canceled = wait_until(Duration::from_secs(10), || {
        let mocks = mocks.clone();
        let pool = pool.clone();
        async move {
            ticket_count(&pool, "t-1").await == 0
                && mocks.spreadsheets.rows(SHEET_TICKETS_TO_REFUND).len() == 1
        }
    })
    .await;
    assert!(canceled, "cancellation was not handled");
    assert_eq!(
        h.mocks.spreadsheets.rows(SHEET_TICKETS_TO_REFUND)[0],
        vec!["t-1", "fan@example.com", "42.00", "GBP"]
    );

    h.stop().await;
}

#[tokio::test]
#[serial]
async fn confirmation_and_cancellation_under_one_key_are_both_recorded() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    let (status, _, _) = h
        .send(json_request("POST", "/tickets-status", status_body("t-9", "confirmed"), Some("K1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = h
        .send(json_request("POST", "/tickets-status", status_body("t-9", "canceled"), Some("K1")))
        .await;
    assert_eq!(status, StatusCode::OK);

    // repeating either request is still a no-op
    h.send(json_request("POST", "/tickets-status", status_body("t-9", "canceled"), Some("K1")))
        .await;

    assert_eq!(outbox_count(&pool, "TicketBookingConfirmed").await, 1);
    assert_eq!(outbox_count(&pool, "TicketBookingCanceled").await, 1);

    let mocks = h.mocks.clone();
    let tracked = wait_until(Duration::from_secs(10), || {
        let mocks = mocks.clone();
        async move {
            mocks.spreadsheets.rows(SHEET_TICKETS_TO_PRINT).len() == 1
                && mocks.spreadsheets.rows(SHEET_TICKETS_TO_REFUND).len() == 1
        }
    })
    .await;
    assert!(tracked, "both status changes reach their trackers");

    h.stop().await;
}

#[tokio::test]
#[serial]
async fn refund_request_is_accepted_and_carried_out_once() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    for _ in 0..2 {
        let request = Request::put("/ticket-refund/t-7")
            .header("Idempotency-Key", "R1")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = h.send(request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    assert_eq!(outbox_count(&pool, "RefundTicket").await, 1);

    let mocks = h.mocks.clone();
    let refunded = wait_until(Duration::from_secs(10), || {
        let mocks = mocks.clone();
        async move { mocks.receipts.voided().len() == 1 }
    })
    .await;
    assert!(refunded);
    assert_eq!(h.mocks.payments.refunds(), vec![("R1".to_string(), "t-7".to_string())]);

    h.stop().await;
}

#[tokio::test]
#[serial]
async fn invalid_requests_are_rejected() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    let (status, body, _) = h
        .send(json_request("POST", "/tickets-status", status_body("t-1", "confirmed"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _, _) = h
        .send(json_request("POST", "/tickets-status", status_body("t-1", "lost"), Some("K1")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unstorable_price = json!({
        "tickets": [{
            "ticket_id": "t-1",
            "status": "confirmed",
            "customer_email": "fan@example.com",
            "price": {"amount": "not-a-number", "currency": "EURO"}
        }]
    });
    let (status, body, _) = h
        .send(json_request("POST", "/tickets-status", unstorable_price, Some("K2")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    assert_eq!(book(&h, Uuid::new_v4(), 1).await, StatusCode::NOT_FOUND);
    assert_eq!(outbox_count(&pool, "TicketBookingConfirmed").await, 0);

    h.stop().await;
}

#[tokio::test]
#[serial]
async fn correlation_id_is_echoed_and_threaded_into_messages() {
    let Some(pool) = get_test_pool().await else { return };
    reset(&pool).await;
    let h = Harness::start(pool.clone()).await;

    let mut request = json_request("POST", "/tickets-status", status_body("t-1", "confirmed"), Some("K1"));
    request
        .headers_mut()
        .insert("Correlation-ID", "corr-http".parse().unwrap());
    let (_, _, echoed) = h.send(request).await;
    assert_eq!(echoed.as_deref(), Some("corr-http"));

    let (_, _, generated) = h
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert!(generated.unwrap().starts_with("gen_"));

    let mocks = h.mocks.clone();
    let handled = wait_until(Duration::from_secs(10), || {
        let mocks = mocks.clone();
        async move { mocks.receipts.issued().len() == 1 }
    })
    .await;
    assert!(handled);
    assert_eq!(h.mocks.receipts.issued()[0].correlation_id, "corr-http");

    h.stop().await;
}
