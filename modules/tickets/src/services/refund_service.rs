use event_bus::MessageContext;
use sqlx::PgPool;

use super::ServiceError;
use crate::contracts::RefundTicket;
use crate::events::outbox;
use crate::repos::idempotency_repo;

const REFUND_MARKER_PREFIX: &str = "refund:";

/// Queue a `RefundTicket` command; `false` when the key was already used
pub async fn request_refund(
    pool: &PgPool,
    ctx: &MessageContext,
    ticket_id: &str,
    idempotency_key: &str,
) -> Result<bool, ServiceError> {
    if ticket_id.trim().is_empty() {
        return Err(ServiceError::Validation("ticket id must not be empty".to_string()));
    }

    let mut tx = pool.begin().await?;

    let marker = format!("{REFUND_MARKER_PREFIX}{idempotency_key}");
    if !idempotency_repo::claim(&mut tx, &marker).await? {
        tracing::info!(ticket_id = %ticket_id, "Refund already requested, skipping");
        return Ok(false);
    }

    let command = RefundTicket::new(ticket_id, idempotency_key);
    outbox::append_message(&mut tx, ctx, &command).await?;
    tx.commit().await?;

    tracing::info!(ticket_id = %ticket_id, "Refund requested");
    Ok(true)
}
