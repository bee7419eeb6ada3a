//! # EventBus Abstraction
//!
//! Durable, per-topic messaging with independent consumer groups, shared by
//! the outbox forwarder (publishing side) and the message router (consuming
//! side).
//!
//! ## Delivery model
//!
//! - Every topic is an append-only log.
//! - Every `(topic, consumer_group)` pair owns a committed cursor. A group
//!   receives every message of the topic at least once, regardless of what
//!   other groups do.
//! - A [`Delivery`] must be acknowledged for the cursor to move past it.
//!   Unacknowledged messages are delivered again when the group resubscribes.
//!
//! ## Implementations
//!
//! - **NatsBus**: NATS JetStream (one stream per topic, one durable pull
//!   consumer per group)
//! - **InMemoryBus**: process-local log for tests and local development
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{BusMessage, EventBus, InMemoryBus};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! bus.publish(BusMessage::new("msg-1", "TicketBookingConfirmed", b"{}".to_vec()))
//!     .await?;
//!
//! let mut deliveries = bus.subscribe("TicketBookingConfirmed", "issue-receipt").await?;
//! if let Some(delivery) = deliveries.next().await {
//!     let delivery = delivery?;
//!     println!("received {}", delivery.message().id);
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer_retry;
mod envelope;
mod inmemory_bus;
mod nats_bus;
pub mod router;

pub use envelope::{
    validate_metadata, Envelope, EnvelopeMetadata, METADATA_CORRELATION_ID,
    METADATA_IDEMPOTENCY_KEY, METADATA_PUBLISHED_AT, METADATA_TYPE,
};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;
pub use router::{
    HandlerError, MessageContext, MessageHandler, Router, RouterConfig, RouterError,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;

/// A message as it travels over the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Unique message identifier
    pub id: String,
    /// The topic this message was published to
    pub topic: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// String metadata (message type, correlation id, idempotency key, ...)
    pub metadata: HashMap<String, String>,
}

impl BusMessage {
    /// Create a new bus message without metadata
    pub fn new(id: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value, treating empty strings as absent
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Acknowledgement half of a [`Delivery`], provided by the bus implementation
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> BusResult<()>;
}

/// A message received by a consumer group, not yet acknowledged
pub struct Delivery {
    message: BusMessage,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(message: BusMessage, acker: Box<dyn Acknowledge>) -> Self {
        Self { message, acker }
    }

    pub fn message(&self) -> &BusMessage {
        &self.message
    }

    /// Advance the consumer group's cursor past this message
    pub async fn ack(self) -> BusResult<()> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to topic: {0}")]
    SubscribeError(String),

    #[error("failed to acknowledge message: {0}")]
    AckError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid topic or consumer group: {0}")]
    InvalidTopic(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Stream of deliveries for one consumer group
pub type DeliveryStream = BoxStream<'static, BusResult<Delivery>>;

/// Core event bus abstraction
///
/// Implementations must deliver every published message at least once to
/// every consumer group subscribed to its topic, in publish order per topic.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Append a message to `message.topic`
    async fn publish(&self, message: BusMessage) -> BusResult<()>;

    /// Open the durable subscription of `consumer_group` on `topic`
    ///
    /// Delivery resumes at the group's committed cursor. A group that has
    /// never been seen starts at the beginning of the topic.
    async fn subscribe(&self, topic: &str, consumer_group: &str) -> BusResult<DeliveryStream>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

/// Reject empty names and names containing whitespace
pub(crate) fn validate_name(kind: &str, name: &str) -> BusResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(BusError::InvalidTopic(format!("{kind} '{name}'")));
    }
    Ok(())
}
