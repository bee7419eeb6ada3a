use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Show;

#[async_trait]
pub trait ShowRepository: Send + Sync {
    async fn add(&self, show: &Show) -> Result<(), sqlx::Error>;

    async fn get(&self, show_id: Uuid) -> Result<Option<Show>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgShowRepository {
    pool: PgPool,
}

impl PgShowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShowRow {
    show_id: Uuid,
    external_show_id: Uuid,
    number_of_tickets: i32,
    start_time: DateTime<Utc>,
    title: String,
    venue: String,
}

impl From<ShowRow> for Show {
    fn from(row: ShowRow) -> Self {
        Self {
            show_id: row.show_id,
            external_show_id: row.external_show_id,
            number_of_tickets: row.number_of_tickets,
            start_time: row.start_time,
            title: row.title,
            venue: row.venue,
        }
    }
}

#[async_trait]
impl ShowRepository for PgShowRepository {
    async fn add(&self, show: &Show) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO shows (show_id, external_show_id, number_of_tickets, start_time, title, venue)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(show.show_id)
        .bind(show.external_show_id)
        .bind(show.number_of_tickets)
        .bind(show.start_time)
        .bind(&show.title)
        .bind(&show.venue)
        .execute(&self.pool)
        .await?;

        tracing::info!(show_id = %show.show_id, "Show created");
        Ok(())
    }

    async fn get(&self, show_id: Uuid) -> Result<Option<Show>, sqlx::Error> {
        let row: Option<ShowRow> = sqlx::query_as(
            r#"
            SELECT show_id, external_show_id, number_of_tickets, start_time, title, venue
            FROM shows
            WHERE show_id = $1
            "#,
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Show::from))
    }
}
