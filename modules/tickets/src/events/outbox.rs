//! Outbox repository for reliable event publishing
//!
//! Uses the transactional outbox pattern: messages are inserted within the
//! same transaction as the state change (or idempotency marker) they
//! describe, and relayed to the bus later by the [forwarder](super::forwarder).

use event_bus::{Envelope, EnvelopeMetadata, MessageContext};
use sqlx::{PgPool, Postgres, Transaction};

use crate::contracts::{to_envelope, DomainMessage};

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Position of a row in outbox order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutboxPosition {
    pub transaction_id: i64,
    pub id: i64,
}

/// An outbox row, decoded
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub position: OutboxPosition,
    pub topic: String,
    pub envelope: Envelope,
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    transaction_id: i64,
    id: i64,
    topic: String,
    message_id: String,
    message_type: String,
    payload: Vec<u8>,
    metadata: serde_json::Value,
}

impl TryFrom<OutboxRow> for OutboxRecord {
    type Error = serde_json::Error;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let metadata: EnvelopeMetadata = serde_json::from_value(row.metadata)?;
        Ok(Self {
            position: OutboxPosition {
                transaction_id: row.transaction_id,
                id: row.id,
            },
            topic: row.topic,
            envelope: Envelope {
                id: row.message_id,
                message_type: row.message_type,
                payload: row.payload,
                metadata,
            },
        })
    }
}

/// Insert an envelope into the outbox on the caller's transaction
///
/// Any error must abort the enclosing transaction; callers propagate it
/// with `?` and let the transaction roll back on drop.
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    topic: &str,
    envelope: &Envelope,
) -> Result<(), OutboxError> {
    let metadata = serde_json::to_value(&envelope.metadata)?;

    sqlx::query(
        r#"
        INSERT INTO events_outbox (topic, message_id, message_type, payload, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(topic)
    .bind(&envelope.id)
    .bind(&envelope.message_type)
    .bind(&envelope.payload)
    .bind(metadata)
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        message_id = %envelope.id,
        message_type = %envelope.message_type,
        topic = %topic,
        "Message appended to outbox"
    );

    Ok(())
}

/// Encode a domain message and append it under its own topic
pub async fn append_message<M: DomainMessage>(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &MessageContext,
    message: &M,
) -> Result<(), OutboxError> {
    let envelope = to_envelope(message)?.with_correlation_id(Some(ctx.correlation_id.clone()));
    append(tx, &M::TYPE.topic(), &envelope).await
}

/// Rows after `after`, in outbox order, whose transactions can no longer be
/// overtaken by a transaction that is still running
pub async fn fetch_after(
    pool: &PgPool,
    after: OutboxPosition,
    limit: i64,
) -> Result<Vec<OutboxRecord>, OutboxError> {
    let rows: Vec<OutboxRow> = sqlx::query_as(
        r#"
        SELECT transaction_id::text::bigint AS transaction_id,
               id, topic, message_id, message_type, payload, metadata
        FROM events_outbox
        WHERE (transaction_id, id) > ($1::bigint::text::xid8, $2)
          AND transaction_id < pg_snapshot_xmin(pg_current_snapshot())
        ORDER BY transaction_id ASC, id ASC
        LIMIT $3
        "#,
    )
    .bind(after.transaction_id)
    .bind(after.id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| OutboxRecord::try_from(row).map_err(OutboxError::from))
        .collect()
}

/// Last forwarded position of `consumer_group`, or the start of the outbox
pub async fn load_position(
    pool: &PgPool,
    consumer_group: &str,
) -> Result<OutboxPosition, sqlx::Error> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT last_transaction_id::text::bigint, last_id
        FROM outbox_offsets
        WHERE consumer_group = $1
        "#,
    )
    .bind(consumer_group)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|(transaction_id, id)| OutboxPosition { transaction_id, id })
        .unwrap_or_default())
}

/// Record `position` as forwarded; an older position never overwrites a newer one
pub async fn save_position(
    pool: &PgPool,
    consumer_group: &str,
    position: OutboxPosition,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox_offsets (consumer_group, last_transaction_id, last_id, updated_at)
        VALUES ($1, $2::bigint::text::xid8, $3, NOW())
        ON CONFLICT (consumer_group) DO UPDATE
        SET last_transaction_id = EXCLUDED.last_transaction_id,
            last_id = EXCLUDED.last_id,
            updated_at = NOW()
        WHERE (outbox_offsets.last_transaction_id, outbox_offsets.last_id)
            < (EXCLUDED.last_transaction_id, EXCLUDED.last_id)
        "#,
    )
    .bind(consumer_group)
    .bind(position.transaction_id)
    .bind(position.id)
    .execute(pool)
    .await?;

    Ok(())
}
