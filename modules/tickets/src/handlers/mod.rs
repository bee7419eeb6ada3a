//! Handler registration
//!
//! Consumer group names are stable: renaming one starts a fresh group that
//! replays its topic from the beginning.

mod command_handlers;
mod event_handlers;

pub use command_handlers::CommandHandlers;
pub use event_handlers::{EventHandlers, SHEET_TICKETS_TO_PRINT, SHEET_TICKETS_TO_REFUND};

use event_bus::{MessageContext, Router};
use std::sync::Arc;

use crate::contracts::{BookingMade, RefundTicket, TicketBookingCanceled, TicketBookingConfirmed};
use crate::processors::{CommandProcessor, EventProcessor, HandlerFuture, ProcessorError};

pub const ISSUE_RECEIPT: &str = "issue-receipt";
pub const APPEND_TO_TRACKER_CONFIRMED: &str = "append-to-tracker-confirmed";
pub const APPEND_TO_TRACKER_CANCELED: &str = "append-to-tracker-canceled";
pub const STORE_TICKET: &str = "store-ticket";
pub const REMOVE_CANCELED_TICKET: &str = "remove-canceled-ticket";
pub const PRINT_TICKET: &str = "print-ticket";
pub const CREATE_EXTERNAL_BOOKING: &str = "create-external-booking";
pub const REFUND_TICKET: &str = "refund-ticket";

/// Bind a method of a shared handler set into a registrable closure
macro_rules! bind {
    ($handlers:expr, $method:ident, $message:ty) => {{
        let handlers = Arc::clone(&$handlers);
        move |ctx: MessageContext, message: $message| -> HandlerFuture {
            let handlers = Arc::clone(&handlers);
            Box::pin(async move { handlers.$method(&ctx, &message).await })
        }
    }};
}

/// Register every event and command handler on `router`
pub fn register_handlers(
    router: &mut Router,
    events: Arc<EventHandlers>,
    commands: Arc<CommandHandlers>,
) -> Result<(), ProcessorError> {
    let mut event_processor = EventProcessor::new(router);
    event_processor.add_handler(
        ISSUE_RECEIPT,
        bind!(events, issue_receipt, TicketBookingConfirmed),
    )?;
    event_processor.add_handler(
        APPEND_TO_TRACKER_CONFIRMED,
        bind!(events, append_to_tracker_confirmed, TicketBookingConfirmed),
    )?;
    event_processor.add_handler(
        APPEND_TO_TRACKER_CANCELED,
        bind!(events, append_to_tracker_canceled, TicketBookingCanceled),
    )?;
    event_processor.add_handler(
        STORE_TICKET,
        bind!(events, store_ticket, TicketBookingConfirmed),
    )?;
    event_processor.add_handler(
        REMOVE_CANCELED_TICKET,
        bind!(events, remove_canceled_ticket, TicketBookingCanceled),
    )?;
    event_processor.add_handler(
        PRINT_TICKET,
        bind!(events, print_ticket, TicketBookingConfirmed),
    )?;
    event_processor.add_handler(
        CREATE_EXTERNAL_BOOKING,
        bind!(events, create_external_booking, BookingMade),
    )?;

    CommandProcessor::new(router).add_handler(
        REFUND_TICKET,
        bind!(commands, refund_ticket, RefundTicket),
    )?;

    Ok(())
}
