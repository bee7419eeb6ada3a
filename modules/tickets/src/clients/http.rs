use async_trait::async_trait;
use event_bus::MessageContext;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::{
    ticket_file_id, ClientError, ExternalBooking, ExternalBookingClient, FilesClient,
    PaymentsClient, ReceiptsClient, SpreadsheetsClient,
};
use crate::models::Money;

const CORRELATION_ID_HEADER: &str = "Correlation-ID";
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const REFUND_REASON: &str = "customer requested refund";

/// All collaborators behind one gateway base URL
#[derive(Clone)]
pub struct HttpClients {
    base_url: String,
    http_client: Client,
}

impl HttpClients {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http_client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_context(
        &self,
        request: RequestBuilder,
        ctx: &MessageContext,
        idempotency_key: Option<&str>,
    ) -> RequestBuilder {
        let request = request.header(CORRELATION_ID_HEADER, &ctx.correlation_id);
        match idempotency_key {
            Some(key) if !key.is_empty() => request.header(IDEMPOTENCY_KEY_HEADER, key),
            _ => request,
        }
    }
}

/// Accept `accepted` statuses, turn anything else into an error
async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
    accepted: &[StatusCode],
) -> Result<StatusCode, ClientError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(status);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    Err(ClientError::UnexpectedStatus {
        operation,
        status_code: status.as_u16(),
        message,
    })
}

#[derive(Serialize)]
struct IssueReceiptRequest<'a> {
    ticket_id: &'a str,
    price: &'a Money,
    idempotency_key: &'a str,
}

#[derive(Serialize)]
struct VoidReceiptRequest<'a> {
    ticket_id: &'a str,
    reason: &'a str,
    idempotency_key: &'a str,
}

#[derive(Serialize)]
struct AppendRowRequest {
    columns: Vec<String>,
}

#[derive(Serialize)]
struct RefundRequest<'a> {
    payment_reference: &'a str,
    reason: &'a str,
    deduplication_id: &'a str,
}

#[derive(Serialize)]
struct TicketBookingRequest<'a> {
    booking_id: Uuid,
    customer_address: &'a str,
    event_id: Uuid,
    number_of_tickets: i32,
}

#[async_trait]
impl ReceiptsClient for HttpClients {
    async fn issue_receipt(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
        price: &Money,
    ) -> Result<(), ClientError> {
        let request = self.http_client.put(self.url("/receipts-api/receipts")).json(
            &IssueReceiptRequest {
                ticket_id,
                price,
                idempotency_key,
            },
        );
        let response = self
            .with_context(request, ctx, Some(idempotency_key))
            .send()
            .await?;
        check_status(
            "issue receipt",
            response,
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }

    async fn void_receipt(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
    ) -> Result<(), ClientError> {
        let request = self
            .http_client
            .put(self.url("/receipts-api/void-receipt"))
            .json(&VoidReceiptRequest {
                ticket_id,
                reason: REFUND_REASON,
                idempotency_key,
            });
        let response = self
            .with_context(request, ctx, Some(idempotency_key))
            .send()
            .await?;
        check_status("void receipt", response, &[StatusCode::OK]).await?;
        Ok(())
    }
}

#[async_trait]
impl SpreadsheetsClient for HttpClients {
    async fn append_row(
        &self,
        ctx: &MessageContext,
        sheet: &str,
        row: Vec<String>,
    ) -> Result<(), ClientError> {
        let request = self
            .http_client
            .post(self.url(&format!("/spreadsheets-api/sheets/{sheet}/rows")))
            .json(&AppendRowRequest { columns: row });
        let response = self.with_context(request, ctx, None).send().await?;
        check_status("append row", response, &[StatusCode::OK]).await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentsClient for HttpClients {
    async fn refund_payment(
        &self,
        ctx: &MessageContext,
        idempotency_key: &str,
        ticket_id: &str,
    ) -> Result<(), ClientError> {
        let request = self
            .http_client
            .put(self.url("/payments-api/refunds"))
            .json(&RefundRequest {
                payment_reference: ticket_id,
                reason: REFUND_REASON,
                deduplication_id: idempotency_key,
            });
        let response = self
            .with_context(request, ctx, Some(idempotency_key))
            .send()
            .await?;
        check_status("refund payment", response, &[StatusCode::OK]).await?;
        Ok(())
    }
}

#[async_trait]
impl ExternalBookingClient for HttpClients {
    async fn create_booking(
        &self,
        ctx: &MessageContext,
        external_show_id: Uuid,
        booking: &ExternalBooking,
    ) -> Result<(), ClientError> {
        let booking_key = booking.booking_id.to_string();
        let request = self
            .http_client
            .post(self.url("/dead-nation-api/ticket-booking"))
            .json(&TicketBookingRequest {
                booking_id: booking.booking_id,
                customer_address: &booking.customer_email,
                event_id: external_show_id,
                number_of_tickets: booking.number_of_tickets,
            });
        let response = self
            .with_context(request, ctx, Some(&booking_key))
            .send()
            .await?;
        check_status(
            "create external booking",
            response,
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FilesClient for HttpClients {
    async fn generate_ticket_file(
        &self,
        ctx: &MessageContext,
        ticket_id: &str,
        price: &Money,
    ) -> Result<String, ClientError> {
        let file_id = ticket_file_id(ticket_id);
        let content = render_ticket(ticket_id, price);

        let request = self
            .http_client
            .put(self.url(&format!("/files-api/files/{file_id}/content")))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(content);
        let response = self.with_context(request, ctx, None).send().await?;
        let status = check_status(
            "generate ticket file",
            response,
            &[StatusCode::OK, StatusCode::CREATED, StatusCode::CONFLICT],
        )
        .await?;

        if status == StatusCode::CONFLICT {
            tracing::info!(file_id = %file_id, "Ticket file already exists");
        }
        Ok(file_id)
    }
}

fn render_ticket(ticket_id: &str, price: &Money) -> String {
    format!(
        "<html><body>\nTicket ID: {ticket_id}\nPrice amount: {}\nPrice currency: {}\n</body></html>",
        price.amount, price.currency
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let clients = HttpClients::new("http://gateway:8888/").unwrap();
        assert_eq!(
            clients.url("/payments-api/refunds"),
            "http://gateway:8888/payments-api/refunds"
        );
    }

    #[test]
    fn ticket_file_lists_price() {
        let html = render_ticket("t-1", &Money::new("42.00", "GBP"));
        assert!(html.contains("Ticket ID: t-1"));
        assert!(html.contains("Price amount: 42.00"));
        assert!(html.contains("Price currency: GBP"));
        assert_eq!(ticket_file_id("t-1"), "t-1-ticket.html");
    }
}
