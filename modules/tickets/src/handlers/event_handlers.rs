//! Event handlers
//!
//! Each handler runs under its own consumer group and may see the same
//! event more than once. External calls pass the event's idempotency key
//! through unchanged; local writes are insert-if-absent or delete-if-present
//! on the ticket id. Spreadsheet appends cannot be deduplicated by the
//! collaborator, so those handlers record what they applied per consumer
//! group and skip repeats.

use anyhow::Context;
use event_bus::MessageContext;
use std::sync::Arc;

use crate::clients::{
    ExternalBooking, ExternalBookingClient, FilesClient, ReceiptsClient, SpreadsheetsClient,
};
use super::{APPEND_TO_TRACKER_CANCELED, APPEND_TO_TRACKER_CONFIRMED};
use crate::contracts::{
    BookingMade, DomainMessage, TicketBookingCanceled, TicketBookingConfirmed, TicketPrinted,
};
use crate::events::MessagePublisher;
use crate::models::Money;
use crate::repos::{ProcessedMessageRepository, ShowRepository, TicketRepository};

pub const SHEET_TICKETS_TO_PRINT: &str = "tickets-to-print";
pub const SHEET_TICKETS_TO_REFUND: &str = "tickets-to-refund";

const DEFAULT_CURRENCY: &str = "USD";

/// Collaborators shared by all event handlers
#[derive(Clone)]
pub struct EventHandlers {
    pub receipts: Arc<dyn ReceiptsClient>,
    pub spreadsheets: Arc<dyn SpreadsheetsClient>,
    pub files: Arc<dyn FilesClient>,
    pub external_bookings: Arc<dyn ExternalBookingClient>,
    pub tickets: Arc<dyn TicketRepository>,
    pub shows: Arc<dyn ShowRepository>,
    pub processed: Arc<dyn ProcessedMessageRepository>,
    pub publisher: MessagePublisher,
}

fn with_default_currency(price: &Money) -> Money {
    if price.currency.is_empty() {
        Money::new(price.amount.clone(), DEFAULT_CURRENCY)
    } else {
        price.clone()
    }
}

impl EventHandlers {
    pub async fn issue_receipt(
        &self,
        ctx: &MessageContext,
        event: &TicketBookingConfirmed,
    ) -> anyhow::Result<()> {
        let price = with_default_currency(&event.price);
        self.receipts
            .issue_receipt(ctx, &event.header.idempotency_key, &event.ticket_id, &price)
            .await
            .context("issuing receipt")?;

        tracing::info!(ticket_id = %event.ticket_id, "Receipt issued");
        Ok(())
    }

    pub async fn append_to_tracker_confirmed(
        &self,
        ctx: &MessageContext,
        event: &TicketBookingConfirmed,
    ) -> anyhow::Result<()> {
        let price = with_default_currency(&event.price);
        let row = vec![
            event.ticket_id.clone(),
            event.customer_email.clone(),
            price.amount,
            price.currency,
        ];
        self.append_once(ctx, APPEND_TO_TRACKER_CONFIRMED, event, SHEET_TICKETS_TO_PRINT, row)
            .await
    }

    pub async fn append_to_tracker_canceled(
        &self,
        ctx: &MessageContext,
        event: &TicketBookingCanceled,
    ) -> anyhow::Result<()> {
        let row = vec![
            event.ticket_id.clone(),
            event.customer_email.clone(),
            event.price.amount.clone(),
            event.price.currency.clone(),
        ];
        self.append_once(ctx, APPEND_TO_TRACKER_CANCELED, event, SHEET_TICKETS_TO_REFUND, row)
            .await
    }

    /// Append `row` unless `consumer_group` already applied this message
    ///
    /// A crash between the append and the mark still repeats the row on
    /// redelivery.
    async fn append_once<M: DomainMessage>(
        &self,
        ctx: &MessageContext,
        consumer_group: &str,
        message: &M,
        sheet: &str,
        row: Vec<String>,
    ) -> anyhow::Result<()> {
        let header = message.header();
        let key = if header.idempotency_key.is_empty() {
            header.id.as_str()
        } else {
            header.idempotency_key.as_str()
        };

        if self
            .processed
            .exists(consumer_group, key)
            .await
            .context("checking processed messages")?
        {
            tracing::info!(
                consumer_group,
                idempotency_key = %key,
                "Message already applied, skipping"
            );
            return Ok(());
        }

        self.spreadsheets
            .append_row(ctx, sheet, row)
            .await
            .with_context(|| format!("appending row to {sheet}"))?;
        self.processed
            .mark(consumer_group, key, &M::TYPE.to_string())
            .await
            .context("recording processed message")?;
        Ok(())
    }

    pub async fn store_ticket(
        &self,
        _ctx: &MessageContext,
        event: &TicketBookingConfirmed,
    ) -> anyhow::Result<()> {
        self.tickets
            .add(&event.ticket())
            .await
            .context("storing ticket")?;
        Ok(())
    }

    pub async fn remove_canceled_ticket(
        &self,
        _ctx: &MessageContext,
        event: &TicketBookingCanceled,
    ) -> anyhow::Result<()> {
        self.tickets
            .remove(&event.ticket_id)
            .await
            .context("removing canceled ticket")?;
        Ok(())
    }

    /// Generate the ticket file, then announce it with the same idempotency key
    pub async fn print_ticket(
        &self,
        ctx: &MessageContext,
        event: &TicketBookingConfirmed,
    ) -> anyhow::Result<()> {
        let file_id = self
            .files
            .generate_ticket_file(ctx, &event.ticket_id, &event.price)
            .await
            .context("generating ticket file")?;

        let printed = TicketPrinted::new(
            event.header.idempotency_key.clone(),
            event.ticket_id.clone(),
            file_id,
        );
        self.publisher
            .publish(ctx, &printed)
            .await
            .context("publishing TicketPrinted")?;
        Ok(())
    }

    pub async fn create_external_booking(
        &self,
        ctx: &MessageContext,
        event: &BookingMade,
    ) -> anyhow::Result<()> {
        let show_id = event.show_id;
        let booking_id = event.booking_id;

        let show = self
            .shows
            .get(show_id)
            .await
            .context("loading show")?
            .with_context(|| format!("show {show_id} not found"))?;

        let booking = ExternalBooking {
            booking_id,
            customer_email: event.customer_email.clone(),
            number_of_tickets: event.number_of_tickets,
        };
        self.external_bookings
            .create_booking(ctx, show.external_show_id, &booking)
            .await
            .context("creating external booking")?;

        tracing::info!(booking_id = %booking_id, show_id = %show_id, "External booking created");
        Ok(())
    }
}
