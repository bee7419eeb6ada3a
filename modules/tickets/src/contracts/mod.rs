//! Message contracts
//!
//! Every message on the bus is one of a closed set of types. The type tag
//! travels in the envelope metadata; the JSON payload repeats the header so
//! consumers that only see the payload still get the idempotency key.

pub mod commands;
pub mod events;

pub use commands::RefundTicket;
pub use events::{BookingMade, TicketBookingCanceled, TicketBookingConfirmed, TicketPrinted};

use chrono::{DateTime, Utc};
use event_bus::Envelope;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const COMMAND_TOPIC_PREFIX: &str = "commands.";

/// Every message type the system publishes or consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    TicketBookingConfirmed,
    TicketBookingCanceled,
    TicketPrinted,
    BookingMade,
    RefundTicket,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::TicketBookingConfirmed,
        MessageType::TicketBookingCanceled,
        MessageType::TicketPrinted,
        MessageType::BookingMade,
        MessageType::RefundTicket,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketBookingConfirmed => "TicketBookingConfirmed",
            Self::TicketBookingCanceled => "TicketBookingCanceled",
            Self::TicketPrinted => "TicketPrinted",
            Self::BookingMade => "BookingMade",
            Self::RefundTicket => "RefundTicket",
        }
    }

    pub fn is_command(self) -> bool {
        matches!(self, Self::RefundTicket)
    }

    /// Events are published under their type name, commands under
    /// `commands.<type name>`
    pub fn topic(self) -> String {
        if self.is_command() {
            format!("{COMMAND_TOPIC_PREFIX}{}", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type '{s}'"))
    }
}

/// Header embedded in every event and command payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub id: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub idempotency_key: String,
}

impl MessageHeader {
    pub fn new(idempotency_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            published_at: Utc::now(),
            idempotency_key: idempotency_key.into(),
        }
    }
}

/// A typed event or command
pub trait DomainMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: MessageType;

    fn header(&self) -> &MessageHeader;
}

/// Wrap a message in an envelope
///
/// The envelope id and idempotency key are taken from the message header.
/// The correlation id is left for the publishing side to fill in.
pub fn to_envelope<M: DomainMessage>(message: &M) -> Result<Envelope, serde_json::Error> {
    let header = message.header();
    let payload = serde_json::to_vec(message)?;
    let idempotency_key = Some(header.idempotency_key.clone()).filter(|k| !k.is_empty());

    Ok(Envelope::new(M::TYPE.as_str(), payload)
        .with_id(header.id.clone())
        .with_published_at(header.published_at)
        .with_idempotency_key(idempotency_key))
}
