//! Ticket status changes
//!
//! A batch of status changes becomes one event per ticket. The request's
//! idempotency key suffixed with the ticket id is the event's idempotency
//! key. That key, qualified by the event type, is recorded in
//! `idempotency_keys` in the same transaction as the outbox row: a repeated
//! request adds no second event, while a cancellation sent under the key of
//! the confirmation is still recorded.

use event_bus::MessageContext;
use sqlx::PgPool;

use super::ServiceError;
use crate::contracts::{MessageType, TicketBookingCanceled, TicketBookingConfirmed};
use crate::events::outbox;
use crate::models::{Ticket, STATUS_CANCELED, STATUS_CONFIRMED};
use crate::repos::idempotency_repo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Confirmed,
    Canceled,
}

impl TicketStatus {
    pub fn message_type(self) -> MessageType {
        match self {
            Self::Confirmed => MessageType::TicketBookingConfirmed,
            Self::Canceled => MessageType::TicketBookingCanceled,
        }
    }

    pub fn parse(status: &str) -> Result<Self, ServiceError> {
        match status {
            STATUS_CONFIRMED => Ok(Self::Confirmed),
            STATUS_CANCELED => Ok(Self::Canceled),
            other => Err(ServiceError::Validation(format!(
                "unknown ticket status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TicketStatusChange {
    pub ticket: Ticket,
    pub status: TicketStatus,
}

/// Idempotency key of one ticket's event within a batch request
pub fn ticket_idempotency_key(request_key: &str, ticket_id: &str) -> String {
    format!("{request_key}{ticket_id}")
}

/// Marker recorded in `idempotency_keys` for one event of one ticket
pub fn status_change_marker(message_type: MessageType, ticket_key: &str) -> String {
    format!("{message_type}:{ticket_key}")
}

/// Append one event per new status change; returns how many were appended
pub async fn record_status_changes(
    pool: &PgPool,
    ctx: &MessageContext,
    idempotency_key: &str,
    changes: &[TicketStatusChange],
) -> Result<usize, ServiceError> {
    if idempotency_key.is_empty() {
        return Err(ServiceError::Validation(
            "idempotency key must not be empty".to_string(),
        ));
    }

    for change in changes {
        change.ticket.validate().map_err(ServiceError::Validation)?;
    }

    let mut tx = pool.begin().await?;
    let mut appended = 0;

    for change in changes {
        let key = ticket_idempotency_key(idempotency_key, &change.ticket.ticket_id);

        let marker = status_change_marker(change.status.message_type(), &key);
        if !idempotency_repo::claim(&mut tx, &marker).await? {
            tracing::info!(
                ticket_id = %change.ticket.ticket_id,
                idempotency_key = %key,
                "Status change already recorded, skipping"
            );
            continue;
        }

        match change.status {
            TicketStatus::Confirmed => {
                let event = TicketBookingConfirmed::new(key, &change.ticket);
                outbox::append_message(&mut tx, ctx, &event).await?;
            }
            TicketStatus::Canceled => {
                let event = TicketBookingCanceled::new(key, &change.ticket);
                outbox::append_message(&mut tx, ctx, &event).await?;
            }
        }
        appended += 1;
    }

    tx.commit().await?;

    tracing::info!(
        requested = changes.len(),
        appended,
        "Ticket status changes recorded"
    );
    Ok(appended)
}
