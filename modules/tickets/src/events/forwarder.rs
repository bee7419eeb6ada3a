use event_bus::EventBus;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::outbox::{self, OutboxPosition, OutboxRecord};
use crate::config::ForwarderConfig;

/// Cursor name of the forwarder in `outbox_offsets`
pub const FORWARDER_GROUP: &str = "outbox-forwarder";

/// Background task that relays outbox rows to the event bus
///
/// Rows are published in `(transaction_id, id)` order and the stored
/// position only moves past a row once the bus accepted it. A row that
/// cannot be published blocks the forwarder until it can; nothing is
/// skipped. A crash between publish and position update republishes the
/// row on restart, which consumers absorb through their idempotency keys.
pub struct Forwarder {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    config: ForwarderConfig,
    consumer_group: String,
}

impl Forwarder {
    pub fn new(pool: PgPool, bus: Arc<dyn EventBus>, config: ForwarderConfig) -> Self {
        Self {
            pool,
            bus,
            config,
            consumer_group: FORWARDER_GROUP.to_string(),
        }
    }

    /// Use a different cursor row (tests run several forwarders side by side)
    pub fn with_consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = consumer_group.into();
        self
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            consumer_group = %self.consumer_group,
            batch_size = self.config.batch_size,
            "Starting outbox forwarder"
        );

        let mut position = loop {
            match outbox::load_position(&self.pool, &self.consumer_group).await {
                Ok(position) => break position,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load forwarder position");
                    if !self.pause(&token).await {
                        return Ok(());
                    }
                }
            }
        };

        while !token.is_cancelled() {
            let batch = match outbox::fetch_after(&self.pool, position, self.config.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read outbox");
                    if !self.pause(&token).await {
                        break;
                    }
                    continue;
                }
            };

            let full_batch = batch.len() as i64 >= self.config.batch_size;

            for record in batch {
                match self.forward(&record, &token).await {
                    Some(forwarded) => position = forwarded,
                    None => return Ok(()),
                }
            }

            if !full_batch && !self.pause(&token).await {
                break;
            }
        }

        tracing::info!(consumer_group = %self.consumer_group, "Outbox forwarder stopped");
        Ok(())
    }

    /// Publish one record and persist its position, retrying until both
    /// succeed. Returns `None` when cancelled first.
    async fn forward(
        &self,
        record: &OutboxRecord,
        token: &CancellationToken,
    ) -> Option<OutboxPosition> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            let message = record.envelope.clone().into_bus_message(record.topic.clone());
            match self.bus.publish(message).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(
                        event_id = %record.envelope.id,
                        topic = %record.topic,
                        attempt,
                        error = %e,
                        "Failed to publish outbox message"
                    );
                    if !self.pause(token).await {
                        return None;
                    }
                }
            }
        }

        tracing::debug!(
            event_id = %record.envelope.id,
            message_type = %record.envelope.message_type,
            topic = %record.topic,
            "Outbox message forwarded"
        );

        loop {
            match outbox::save_position(&self.pool, &self.consumer_group, record.position).await {
                Ok(()) => return Some(record.position),
                Err(e) => {
                    tracing::error!(
                        event_id = %record.envelope.id,
                        error = %e,
                        "Failed to store forwarder position"
                    );
                    if !self.pause(token).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep for one poll interval; `false` when cancelled meanwhile
    async fn pause(&self, token: &CancellationToken) -> bool {
        sleep_or_cancel(self.config.poll_interval, token).await
    }
}

async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
