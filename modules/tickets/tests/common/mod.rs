//! Common test utilities for tickets tests
//!
//! ## Database
//! Postgres-backed tests open a small pool each and are skipped when
//! `DATABASE_URL` is not set. Each test calls [`reset`] first and runs under
//! `#[serial]`.
//!
//! ## Collaborators
//! The mocks behave like the real collaborators are required to: a repeated
//! call with an idempotency key already seen is accepted and has no effect.

#![allow(dead_code)]

use async_trait::async_trait;
use event_bus::MessageContext;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use tickets_rs::clients::{
    ticket_file_id, ClientError, ExternalBooking, ExternalBookingClient, FilesClient,
    PaymentsClient, ReceiptsClient, SpreadsheetsClient,
};
use tickets_rs::db::{init_pool, migrate};
use tickets_rs::models::{Money, Show, Ticket};
use tickets_rs::repos::{ProcessedMessageRepository, ShowRepository, TicketRepository};
use tickets_rs::Collaborators;

/// Pool with migrations applied, or `None` without `DATABASE_URL`
///
/// Each `#[tokio::test]` owns its runtime, so every test gets its own pool
/// rather than sharing connections bound to a runtime that already shut down.
pub async fn get_test_pool() -> Option<PgPool> {
    if std::env::var("DB_MAX_CONNECTIONS").is_err() {
        std::env::set_var("DB_MAX_CONNECTIONS", "10");
    }
    if std::env::var("DB_ACQUIRE_TIMEOUT_SECS").is_err() {
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "10");
    }

    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = init_pool(&database_url)
        .await
        .expect("Failed to initialize test pool");
    migrate(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

/// Empty every table the service owns
pub async fn reset(pool: &PgPool) {
    sqlx::query(
        "TRUNCATE events_outbox, outbox_offsets, idempotency_keys, processed_messages, \
         tickets, bookings, shows RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .expect("Failed to reset database");
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn ticket(ticket_id: &str, amount: &str, currency: &str) -> Ticket {
    Ticket {
        ticket_id: ticket_id.to_string(),
        customer_email: format!("{ticket_id}@example.com"),
        price: Money::new(amount, currency),
    }
}

pub fn show(number_of_tickets: i32) -> Show {
    Show {
        show_id: Uuid::new_v4(),
        external_show_id: Uuid::new_v4(),
        number_of_tickets,
        start_time: chrono::Utc::now(),
        title: "The Outbox Tour".to_string(),
        venue: "Main Hall".to_string(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ============================================================
// RECEIPTS
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedReceipt {
    pub idempotency_key: String,
    pub ticket_id: String,
    pub price: Money,
    pub correlation_id: String,
}

#[derive(Default)]
pub struct MockReceipts {
    pub issued: Mutex<Vec<IssuedReceipt>>,
    pub voided: Mutex<Vec<(String, String)>>,
    pub calls: Mutex<usize>,
}

impl MockReceipts {
    pub fn issued(&self) -> Vec<IssuedReceipt> {
        lock(&self.issued).clone()
    }

    pub fn voided(&self) -> Vec<(String, String)> {
        lock(&self.voided).clone()
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl ReceiptsClient for MockReceipts {
    async fn issue_receipt(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
        price: &Money,
    ) -> Result<(), ClientError> {
        *lock(&self.calls) += 1;
        let mut issued = lock(&self.issued);
        if !issued.iter().any(|r| r.idempotency_key == idempotency_key) {
            issued.push(IssuedReceipt {
                idempotency_key: idempotency_key.to_string(),
                ticket_id: ticket_id.to_string(),
                price: price.clone(),
                correlation_id: ctx.correlation_id.clone(),
            });
        }
        Ok(())
    }

    async fn void_receipt(
        &self,
        _ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
    ) -> Result<(), ClientError> {
        let mut voided = lock(&self.voided);
        if !voided.iter().any(|(key, _)| key == idempotency_key) {
            voided.push((idempotency_key.to_string(), ticket_id.to_string()));
        }
        Ok(())
    }
}

// ============================================================
// SPREADSHEETS
// ============================================================

#[derive(Default)]
pub struct MockSpreadsheets {
    rows: Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl MockSpreadsheets {
    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        lock(&self.rows).get(sheet).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SpreadsheetsClient for MockSpreadsheets {
    async fn append_row(
        &self,
        _ctx: &MessageContext,
        sheet: &str,
        row: Vec<String>,
    ) -> Result<(), ClientError> {
        lock(&self.rows).entry(sheet.to_string()).or_default().push(row);
        Ok(())
    }
}

// ============================================================
// PAYMENTS
// ============================================================

#[derive(Default)]
pub struct MockPayments {
    refunds: Mutex<Vec<(String, String)>>,
    /// Calls that fail before the first success
    failures_left: Mutex<usize>,
}

impl MockPayments {
    pub fn failing(times: usize) -> Self {
        Self {
            refunds: Mutex::new(Vec::new()),
            failures_left: Mutex::new(times),
        }
    }

    pub fn refunds(&self) -> Vec<(String, String)> {
        lock(&self.refunds).clone()
    }
}

#[async_trait]
impl PaymentsClient for MockPayments {
    async fn refund_payment(
        &self,
        _ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
    ) -> Result<(), ClientError> {
        {
            let mut failures_left = lock(&self.failures_left);
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(ClientError::UnexpectedStatus {
                    operation: "refund payment",
                    status_code: 503,
                    message: "payments unavailable".to_string(),
                });
            }
        }

        let mut refunds = lock(&self.refunds);
        if !refunds.iter().any(|(key, _)| key == idempotency_key) {
            refunds.push((idempotency_key.to_string(), ticket_id.to_string()));
        }
        Ok(())
    }
}

// ============================================================
// EXTERNAL BOOKINGS
// ============================================================

#[derive(Default)]
pub struct MockExternalBookings {
    bookings: Mutex<Vec<(Uuid, ExternalBooking)>>,
}

impl MockExternalBookings {
    pub fn bookings(&self) -> Vec<(Uuid, ExternalBooking)> {
        lock(&self.bookings).clone()
    }
}

#[async_trait]
impl ExternalBookingClient for MockExternalBookings {
    async fn create_booking(
        &self,
        _ctx: &MessageContext,
        external_show_id: Uuid,
        booking: &ExternalBooking,
    ) -> Result<(), ClientError> {
        let mut bookings = lock(&self.bookings);
        if !bookings.iter().any(|(_, b)| b.booking_id == booking.booking_id) {
            bookings.push((external_show_id, booking.clone()));
        }
        Ok(())
    }
}

// ============================================================
// FILES
// ============================================================

#[derive(Default)]
pub struct MockFiles {
    files: Mutex<HashSet<String>>,
}

impl MockFiles {
    pub fn files(&self) -> HashSet<String> {
        lock(&self.files).clone()
    }
}

#[async_trait]
impl FilesClient for MockFiles {
    async fn generate_ticket_file(
        &self,
        _ctx: &MessageContext,
        ticket_id: &str,
        _price: &Money,
    ) -> Result<String, ClientError> {
        let file_id = ticket_file_id(ticket_id);
        lock(&self.files).insert(file_id.clone());
        Ok(file_id)
    }
}

/// Every mock, kept for assertions
#[derive(Clone, Default)]
pub struct Mocks {
    pub receipts: Arc<MockReceipts>,
    pub spreadsheets: Arc<MockSpreadsheets>,
    pub payments: Arc<MockPayments>,
    pub external_bookings: Arc<MockExternalBookings>,
    pub files: Arc<MockFiles>,
}

impl Mocks {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            receipts: self.receipts.clone(),
            spreadsheets: self.spreadsheets.clone(),
            files: self.files.clone(),
            external_bookings: self.external_bookings.clone(),
            payments: self.payments.clone(),
        }
    }
}

// ============================================================
// IN-MEMORY REPOSITORIES
// ============================================================

#[derive(Default)]
pub struct InMemoryTickets {
    tickets: Mutex<Vec<Ticket>>,
}

impl InMemoryTickets {
    pub fn with(tickets: Vec<Ticket>) -> Self {
        Self {
            tickets: Mutex::new(tickets),
        }
    }
}

#[async_trait]
impl TicketRepository for InMemoryTickets {
    async fn add(&self, ticket: &Ticket) -> Result<(), sqlx::Error> {
        let mut tickets = lock(&self.tickets);
        if !tickets.iter().any(|t| t.ticket_id == ticket.ticket_id) {
            tickets.push(ticket.clone());
        }
        Ok(())
    }

    async fn remove(&self, ticket_id: &str) -> Result<(), sqlx::Error> {
        lock(&self.tickets).retain(|t| t.ticket_id != ticket_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Ticket>, sqlx::Error> {
        Ok(lock(&self.tickets).clone())
    }
}

#[derive(Default)]
pub struct InMemoryShows {
    shows: Mutex<Vec<Show>>,
}

#[async_trait]
impl ShowRepository for InMemoryShows {
    async fn add(&self, show: &Show) -> Result<(), sqlx::Error> {
        lock(&self.shows).push(show.clone());
        Ok(())
    }

    async fn get(&self, show_id: Uuid) -> Result<Option<Show>, sqlx::Error> {
        Ok(lock(&self.shows).iter().find(|s| s.show_id == show_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryProcessed {
    keys: Mutex<HashSet<(String, String)>>,
}

#[async_trait]
impl ProcessedMessageRepository for InMemoryProcessed {
    async fn exists(
        &self,
        consumer_group: &str,
        idempotency_key: &str,
    ) -> Result<bool, sqlx::Error> {
        let key = (consumer_group.to_string(), idempotency_key.to_string());
        Ok(lock(&self.keys).contains(&key))
    }

    async fn mark(
        &self,
        consumer_group: &str,
        idempotency_key: &str,
        _message_type: &str,
    ) -> Result<(), sqlx::Error> {
        lock(&self.keys).insert((consumer_group.to_string(), idempotency_key.to_string()));
        Ok(())
    }
}
