use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{Money, Ticket};

/// Read model of confirmed tickets
///
/// Writes are keyed on the ticket id and safe to repeat: adding a stored
/// ticket and removing an absent one both succeed without changes.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn add(&self, ticket: &Ticket) -> Result<(), sqlx::Error>;

    async fn remove(&self, ticket_id: &str) -> Result<(), sqlx::Error>;

    async fn list(&self) -> Result<Vec<Ticket>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgTicketRepository {
    pool: PgPool,
}

impl PgTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    ticket_id: String,
    customer_email: String,
    price_amount: String,
    price_currency: String,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            ticket_id: row.ticket_id,
            customer_email: row.customer_email,
            price: Money::new(row.price_amount, row.price_currency),
        }
    }
}

#[async_trait]
impl TicketRepository for PgTicketRepository {
    async fn add(&self, ticket: &Ticket) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (ticket_id, price_amount, price_currency, customer_email)
            VALUES ($1, $2::numeric, $3, $4)
            ON CONFLICT (ticket_id) DO NOTHING
            "#,
        )
        .bind(&ticket.ticket_id)
        .bind(&ticket.price.amount)
        .bind(&ticket.price.currency)
        .bind(&ticket.customer_email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(ticket_id = %ticket.ticket_id, "Ticket already stored");
        }
        Ok(())
    }

    async fn remove(&self, ticket_id: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM tickets WHERE ticket_id = $1")
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(ticket_id = %ticket_id, "Ticket already removed");
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Ticket>, sqlx::Error> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            r#"
            SELECT ticket_id, customer_email,
                   price_amount::text AS price_amount,
                   price_currency::text AS price_currency
            FROM tickets
            ORDER BY created_at, ticket_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }
}
