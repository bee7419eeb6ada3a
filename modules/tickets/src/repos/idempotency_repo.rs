use sqlx::{Postgres, Transaction};

/// Record `key` as used; `false` when it was recorded before
///
/// Runs on the caller's transaction, so the marker commits together with
/// whatever the caller writes next (typically outbox rows).
pub async fn claim(
    tx: &mut Transaction<'_, Postgres>,
    idempotency_key: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO idempotency_keys (idempotency_key)
        VALUES ($1)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(idempotency_key)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}
