use crate::{BusMessage, METADATA_CORRELATION_ID};
use uuid::Uuid;

/// Prefix of correlation ids minted locally rather than received
pub const GENERATED_CORRELATION_PREFIX: &str = "gen_";

/// Per-message (or per-request) context threaded explicitly through handlers
/// and publishers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub correlation_id: String,
    /// Id of the message being handled, absent outside message handling
    pub message_id: Option<String>,
    pub consumer_group: Option<String>,
}

impl MessageContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            message_id: None,
            consumer_group: None,
        }
    }

    /// Context with a freshly generated correlation id
    pub fn generated() -> Self {
        Self::new(new_correlation_id())
    }

    /// Correlation id from the message metadata, or a generated one
    pub fn from_message(message: &BusMessage, consumer_group: &str) -> Self {
        let correlation_id = message
            .metadata(METADATA_CORRELATION_ID)
            .map(str::to_string)
            .unwrap_or_else(new_correlation_id);

        Self {
            correlation_id,
            message_id: Some(message.id.clone()),
            consumer_group: Some(consumer_group.to_string()),
        }
    }
}

pub fn new_correlation_id() -> String {
    format!("{GENERATED_CORRELATION_PREFIX}{}", Uuid::new_v4())
}
