use serde::{Deserialize, Serialize};

use super::{DomainMessage, MessageHeader, MessageType};

/// Refund the payment of a ticket and void its receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTicket {
    pub header: MessageHeader,
    pub ticket_id: String,
}

impl RefundTicket {
    pub fn new(ticket_id: impl Into<String>, idempotency_key: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::new(idempotency_key),
            ticket_id: ticket_id.into(),
        }
    }
}

impl DomainMessage for RefundTicket {
    const TYPE: MessageType = MessageType::RefundTicket;

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}
