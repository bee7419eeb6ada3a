use async_trait::async_trait;
use sqlx::PgPool;

/// Per consumer group record of messages already applied
///
/// Check with `exists` before the side effect and `mark` after it.
#[async_trait]
pub trait ProcessedMessageRepository: Send + Sync {
    async fn exists(&self, consumer_group: &str, idempotency_key: &str)
        -> Result<bool, sqlx::Error>;

    async fn mark(
        &self,
        consumer_group: &str,
        idempotency_key: &str,
        message_type: &str,
    ) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgProcessedMessageRepository {
    pool: PgPool,
}

impl PgProcessedMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedMessageRepository for PgProcessedMessageRepository {
    async fn exists(
        &self,
        consumer_group: &str,
        idempotency_key: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM processed_messages
                WHERE consumer_group = $1 AND idempotency_key = $2
            )
            "#,
        )
        .bind(consumer_group)
        .bind(idempotency_key)
        .fetch_one(&self.pool)
        .await
    }

    async fn mark(
        &self,
        consumer_group: &str,
        idempotency_key: &str,
        message_type: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO processed_messages (consumer_group, idempotency_key, message_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (consumer_group, idempotency_key) DO NOTHING
            "#,
        )
        .bind(consumer_group)
        .bind(idempotency_key)
        .bind(message_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
