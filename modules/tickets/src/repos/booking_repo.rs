//! Capacity-checked bookings
//!
//! A booking is inserted in a SERIALIZABLE transaction that first sums the
//! tickets already booked for the show. Two concurrent requests that would
//! together overbook the show cannot both commit; the loser gets
//! [`BookingError::Conflict`] and may retry. The `BookingMade` event is
//! written to the outbox in the same transaction.

use event_bus::MessageContext;
use sqlx::PgPool;
use uuid::Uuid;

use crate::contracts::BookingMade;
use crate::db::is_serialization_failure;
use crate::events::outbox::{self, OutboxError};
use crate::models::Booking;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("show {0} not found")]
    ShowNotFound(Uuid),

    #[error("not enough tickets available: requested {requested}, available {available}")]
    NotEnoughTickets { available: i64, requested: i32 },

    #[error("booking conflicted with a concurrent booking, retry")]
    Conflict,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("failed to encode event: {0}")]
    Encode(serde_json::Error),
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        if is_serialization_failure(&err) {
            Self::Conflict
        } else {
            Self::Database(err)
        }
    }
}

impl From<OutboxError> for BookingError {
    fn from(err: OutboxError) -> Self {
        match err {
            OutboxError::Database(e) => Self::from(e),
            OutboxError::Encode(e) => Self::Encode(e),
        }
    }
}

/// Insert `booking` if the show still has room for it
///
/// Nothing is persisted when this returns an error.
pub async fn book(
    pool: &PgPool,
    ctx: &MessageContext,
    booking: &Booking,
    idempotency_key: &str,
) -> Result<(), BookingError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;

    let capacity: Option<i32> =
        sqlx::query_scalar("SELECT number_of_tickets FROM shows WHERE show_id = $1")
            .bind(booking.show_id)
            .fetch_optional(&mut *tx)
            .await?;
    let capacity = capacity.ok_or(BookingError::ShowNotFound(booking.show_id))?;

    let booked: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(number_of_tickets), 0)::bigint
        FROM bookings
        WHERE show_id = $1
        "#,
    )
    .bind(booking.show_id)
    .fetch_one(&mut *tx)
    .await?;

    let available = i64::from(capacity) - booked;
    if i64::from(booking.number_of_tickets) > available {
        return Err(BookingError::NotEnoughTickets {
            available,
            requested: booking.number_of_tickets,
        });
    }

    sqlx::query(
        r#"
        INSERT INTO bookings (booking_id, show_id, number_of_tickets, customer_email)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(booking.booking_id)
    .bind(booking.show_id)
    .bind(booking.number_of_tickets)
    .bind(&booking.customer_email)
    .execute(&mut *tx)
    .await?;

    outbox::append_message(&mut tx, ctx, &BookingMade::new(idempotency_key, booking)).await?;

    tx.commit().await?;

    tracing::info!(
        booking_id = %booking.booking_id,
        show_id = %booking.show_id,
        number_of_tickets = booking.number_of_tickets,
        "Booking made"
    );
    Ok(())
}

/// Tickets booked so far for a show
pub async fn booked_tickets(pool: &PgPool, show_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(number_of_tickets), 0)::bigint
        FROM bookings
        WHERE show_id = $1
        "#,
    )
    .bind(show_id)
    .fetch_one(pool)
    .await
}
