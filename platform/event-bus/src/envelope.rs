//! # Message Envelope
//!
//! The unit stored in the outbox and carried over the bus.
//!
//! ## Wire format
//!
//! An envelope becomes a [`BusMessage`] with:
//!
//! - `id`: the envelope id (unique per message, stable across redeliveries)
//! - `payload`: the serialized domain event or command
//! - metadata `type`: the message type tag the router dispatches on
//! - metadata `correlation_id`: links related messages and requests
//! - metadata `idempotency_key`: the key downstream effects deduplicate on
//! - metadata `published_at`: RFC 3339 timestamp of envelope creation

use crate::BusMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const METADATA_TYPE: &str = "type";
pub const METADATA_CORRELATION_ID: &str = "correlation_id";
pub const METADATA_IDEMPOTENCY_KEY: &str = "idempotency_key";
pub const METADATA_PUBLISHED_AT: &str = "published_at";

/// Metadata carried next to every payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub published_at: DateTime<Utc>,
}

/// An immutable, typed-by-tag message
///
/// # Examples
///
/// ```rust
/// use event_bus::Envelope;
///
/// let envelope = Envelope::new("TicketPrinted", br#"{"ticket_id":"t-1"}"#.to_vec())
///     .with_correlation_id(Some("corr-1".to_string()))
///     .with_idempotency_key(Some("key-1".to_string()));
///
/// let message = envelope.clone().into_bus_message("TicketPrinted");
/// assert_eq!(message.metadata("type"), Some("TicketPrinted"));
/// assert_eq!(message.id, envelope.id);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: String,
    pub message_type: String,
    pub payload: Vec<u8>,
    pub metadata: EnvelopeMetadata,
}

impl Envelope {
    /// Create an envelope with a fresh id and the current time
    pub fn new(message_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: message_type.into(),
            payload,
            metadata: EnvelopeMetadata {
                correlation_id: None,
                idempotency_key: None,
                published_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.metadata.correlation_id = correlation_id;
        self
    }

    pub fn with_idempotency_key(mut self, idempotency_key: Option<String>) -> Self {
        self.metadata.idempotency_key = idempotency_key;
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.metadata.published_at = published_at;
        self
    }

    /// Convert into the wire form for `topic`
    pub fn into_bus_message(self, topic: impl Into<String>) -> BusMessage {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_TYPE.to_string(), self.message_type);
        metadata.insert(
            METADATA_PUBLISHED_AT.to_string(),
            self.metadata.published_at.to_rfc3339(),
        );
        if let Some(correlation_id) = self.metadata.correlation_id {
            metadata.insert(METADATA_CORRELATION_ID.to_string(), correlation_id);
        }
        if let Some(idempotency_key) = self.metadata.idempotency_key {
            metadata.insert(METADATA_IDEMPOTENCY_KEY.to_string(), idempotency_key);
        }

        BusMessage {
            id: self.id,
            topic: topic.into(),
            payload: self.payload,
            metadata,
        }
    }
}

/// Validate bus metadata
///
/// # Validation Rules
///
/// - `type`: must be present and non-empty
/// - `published_at`: optional, must be RFC 3339 when present
pub fn validate_metadata(metadata: &HashMap<String, String>) -> Result<(), String> {
    let message_type = metadata
        .get(METADATA_TYPE)
        .ok_or("Missing message type")?;

    if message_type.is_empty() {
        return Err("message type cannot be empty".to_string());
    }

    if let Some(published_at) = metadata.get(METADATA_PUBLISHED_AT) {
        DateTime::parse_from_rfc3339(published_at)
            .map_err(|e| format!("invalid published_at: {e}"))?;
    }

    Ok(())
}
