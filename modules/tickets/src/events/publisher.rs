//! Direct publishing for handlers
//!
//! Handlers that emit follow-up messages (e.g. `TicketPrinted`) publish
//! straight to the bus; the state change they react to is already durable
//! upstream. Decoration is composition: [`CorrelationPublisher`] wraps any
//! [`Publisher`] and stamps the correlation id of the message being handled.

use async_trait::async_trait;
use event_bus::{BusError, Envelope, EventBus, MessageContext};
use std::sync::Arc;

use crate::contracts::{to_envelope, DomainMessage};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        ctx: &MessageContext,
        topic: &str,
        envelope: Envelope,
    ) -> Result<(), PublishError>;
}

/// Publishes envelopes as-is
pub struct BusPublisher {
    bus: Arc<dyn EventBus>,
}

impl BusPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Publisher for BusPublisher {
    async fn publish(
        &self,
        _ctx: &MessageContext,
        topic: &str,
        envelope: Envelope,
    ) -> Result<(), PublishError> {
        self.bus.publish(envelope.into_bus_message(topic)).await?;
        Ok(())
    }
}

/// Fills in the context's correlation id when the envelope has none
pub struct CorrelationPublisher<P> {
    inner: P,
}

impl<P: Publisher> CorrelationPublisher<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: Publisher> Publisher for CorrelationPublisher<P> {
    async fn publish(
        &self,
        ctx: &MessageContext,
        topic: &str,
        mut envelope: Envelope,
    ) -> Result<(), PublishError> {
        if envelope.metadata.correlation_id.is_none() {
            envelope.metadata.correlation_id = Some(ctx.correlation_id.clone());
        }
        self.inner.publish(ctx, topic, envelope).await
    }
}

/// Typed front for a [`Publisher`]
#[derive(Clone)]
pub struct MessagePublisher {
    inner: Arc<dyn Publisher>,
}

impl MessagePublisher {
    pub fn new(inner: Arc<dyn Publisher>) -> Self {
        Self { inner }
    }

    /// Bus publisher decorated with correlation propagation
    pub fn for_bus(bus: Arc<dyn EventBus>) -> Self {
        Self::new(Arc::new(CorrelationPublisher::new(BusPublisher::new(bus))))
    }

    pub async fn publish<M: DomainMessage>(
        &self,
        ctx: &MessageContext,
        message: &M,
    ) -> Result<(), PublishError> {
        let envelope = to_envelope(message)?;
        self.inner.publish(ctx, &M::TYPE.topic(), envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::TicketPrinted;
    use event_bus::{InMemoryBus, METADATA_CORRELATION_ID, METADATA_TYPE};

    #[tokio::test]
    async fn stamps_context_correlation_id() {
        let bus = InMemoryBus::new();
        let publisher = MessagePublisher::for_bus(Arc::new(bus.clone()));
        let ctx = MessageContext::new("corr-7");

        publisher
            .publish(&ctx, &TicketPrinted::new("K1t-1", "t-1", "t-1-ticket.html"))
            .await
            .unwrap();

        let published = bus.published("TicketPrinted");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].metadata(METADATA_CORRELATION_ID), Some("corr-7"));
        assert_eq!(published[0].metadata(METADATA_TYPE), Some("TicketPrinted"));
    }

    #[tokio::test]
    async fn keeps_existing_correlation_id() {
        let bus = InMemoryBus::new();
        let publisher = CorrelationPublisher::new(BusPublisher::new(Arc::new(bus.clone())));
        let envelope = Envelope::new("TicketPrinted", b"{}".to_vec())
            .with_correlation_id(Some("upstream".to_string()));

        publisher
            .publish(&MessageContext::new("local"), "TicketPrinted", envelope)
            .await
            .unwrap();

        let published = bus.published("TicketPrinted");
        assert_eq!(published[0].metadata(METADATA_CORRELATION_ID), Some("upstream"));
    }
}
