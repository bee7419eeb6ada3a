use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DomainMessage, MessageHeader, MessageType};
use crate::models::{Booking, Money, Ticket};

/// A ticket was confirmed for a customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBookingConfirmed {
    pub header: MessageHeader,
    pub ticket_id: String,
    pub customer_email: String,
    pub price: Money,
}

impl TicketBookingConfirmed {
    pub fn new(idempotency_key: impl Into<String>, ticket: &Ticket) -> Self {
        Self {
            header: MessageHeader::new(idempotency_key),
            ticket_id: ticket.ticket_id.clone(),
            customer_email: ticket.customer_email.clone(),
            price: ticket.price.clone(),
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            ticket_id: self.ticket_id.clone(),
            customer_email: self.customer_email.clone(),
            price: self.price.clone(),
        }
    }
}

impl DomainMessage for TicketBookingConfirmed {
    const TYPE: MessageType = MessageType::TicketBookingConfirmed;

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

/// A previously confirmed ticket was canceled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBookingCanceled {
    pub header: MessageHeader,
    pub ticket_id: String,
    pub customer_email: String,
    pub price: Money,
}

impl TicketBookingCanceled {
    pub fn new(idempotency_key: impl Into<String>, ticket: &Ticket) -> Self {
        Self {
            header: MessageHeader::new(idempotency_key),
            ticket_id: ticket.ticket_id.clone(),
            customer_email: ticket.customer_email.clone(),
            price: ticket.price.clone(),
        }
    }
}

impl DomainMessage for TicketBookingCanceled {
    const TYPE: MessageType = MessageType::TicketBookingCanceled;

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

/// The ticket file was generated and stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPrinted {
    pub header: MessageHeader,
    pub ticket_id: String,
    pub file_name: String,
}

impl TicketPrinted {
    pub fn new(
        idempotency_key: impl Into<String>,
        ticket_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            header: MessageHeader::new(idempotency_key),
            ticket_id: ticket_id.into(),
            file_name: file_name.into(),
        }
    }
}

impl DomainMessage for TicketPrinted {
    const TYPE: MessageType = MessageType::TicketPrinted;

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingMade {
    pub header: MessageHeader,
    pub booking_id: Uuid,
    pub show_id: Uuid,
    pub number_of_tickets: i32,
    pub customer_email: String,
}

impl BookingMade {
    pub fn new(idempotency_key: impl Into<String>, booking: &Booking) -> Self {
        Self {
            header: MessageHeader::new(idempotency_key),
            booking_id: booking.booking_id,
            show_id: booking.show_id,
            number_of_tickets: booking.number_of_tickets,
            customer_email: booking.customer_email.clone(),
        }
    }
}

impl DomainMessage for BookingMade {
    const TYPE: MessageType = MessageType::BookingMade;

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}
