//! External collaborators reached by the message handlers
//!
//! Every call that has an effect outside this service carries the
//! idempotency key of the message being handled. The collaborators are
//! expected to deduplicate on `(key, operation)` and answer a repeated call
//! with the original result.

mod http;

pub use http::HttpClients;

use async_trait::async_trait;
use event_bus::MessageContext;
use serde::Serialize;
use uuid::Uuid;

use crate::models::Money;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status_code} from {operation}: {message}")]
    UnexpectedStatus {
        operation: &'static str,
        status_code: u16,
        message: String,
    },
}

/// Booking as sent to the external booking provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalBooking {
    pub booking_id: Uuid,
    pub customer_email: String,
    pub number_of_tickets: i32,
}

#[async_trait]
pub trait ReceiptsClient: Send + Sync {
    async fn issue_receipt(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
        price: &Money,
    ) -> Result<(), ClientError>;

    async fn void_receipt(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
    ) -> Result<(), ClientError>;
}

#[async_trait]
pub trait SpreadsheetsClient: Send + Sync {
    async fn append_row(
        &self,
        ctx: &MessageContext,
        sheet: &str,
        row: Vec<String>,
    ) -> Result<(), ClientError>;
}

#[async_trait]
pub trait PaymentsClient: Send + Sync {
    async fn refund_payment(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
    ) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ExternalBookingClient: Send + Sync {
    /// Book at the provider; the booking id doubles as deduplication key
    async fn create_booking(
        &self,
        ctx: &MessageContext,
        external_show_id: Uuid,
        booking: &ExternalBooking,
    ) -> Result<(), ClientError>;
}

#[async_trait]
pub trait FilesClient: Send + Sync {
    /// Store the ticket file and return its id; an existing file counts as stored
    async fn generate_ticket_file(
        &self,
        ctx: &MessageContext,
        ticket_id: &str,
        price: &Money,
    ) -> Result<String, ClientError>;
}

/// File id under which a ticket's printable file is stored
pub fn ticket_file_id(ticket_id: &str) -> String {
    format!("{ticket_id}-ticket.html")
}
