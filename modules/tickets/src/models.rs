//! Domain entities shared by the HTTP surface, repositories and handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_CANCELED: &str = "canceled";

/// Digits allowed before the decimal point by `NUMERIC(10, 2)`
const MAX_AMOUNT_INTEGER_DIGITS: usize = 8;
const MAX_AMOUNT_FRACTION_DIGITS: usize = 2;
const MAX_EMAIL_LENGTH: usize = 255;

/// Monetary amount as exchanged with clients and collaborators
///
/// The amount stays a decimal string (e.g. "42.00") end to end; only the
/// database stores it as NUMERIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

impl Money {
    pub fn new(amount: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
        }
    }

    /// Accepts a non-negative decimal with at most two fraction digits and
    /// either no currency or a three-letter code
    pub fn validate(&self) -> Result<(), String> {
        let (integer, fraction) = match self.amount.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (self.amount.as_str(), None),
        };

        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        let valid_fraction = match fraction {
            Some(f) => digits(f) && f.len() <= MAX_AMOUNT_FRACTION_DIGITS,
            None => true,
        };
        let valid_amount =
            digits(integer) && integer.len() <= MAX_AMOUNT_INTEGER_DIGITS && valid_fraction;
        if !valid_amount {
            return Err(format!("invalid price amount '{}'", self.amount));
        }

        let valid_currency = self.currency.is_empty()
            || (self.currency.len() == 3 && self.currency.bytes().all(|b| b.is_ascii_alphabetic()));
        if !valid_currency {
            return Err(format!("invalid currency '{}'", self.currency));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub customer_email: String,
    pub price: Money,
}

impl Ticket {
    pub fn validate(&self) -> Result<(), String> {
        if self.ticket_id.trim().is_empty() {
            return Err("ticket id must not be empty".to_string());
        }
        if self.customer_email.chars().count() > MAX_EMAIL_LENGTH {
            return Err(format!(
                "customer email of ticket '{}' is longer than {MAX_EMAIL_LENGTH} characters",
                self.ticket_id
            ));
        }
        self.price
            .validate()
            .map_err(|e| format!("ticket '{}': {e}", self.ticket_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Show {
    pub show_id: Uuid,
    /// Identifier of the show at the external booking provider
    pub external_show_id: Uuid,
    pub number_of_tickets: i32,
    pub start_time: DateTime<Utc>,
    pub title: String,
    pub venue: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub booking_id: Uuid,
    pub show_id: Uuid,
    pub number_of_tickets: i32,
    pub customer_email: String,
}
