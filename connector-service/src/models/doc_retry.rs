// connector-service/src/models/doc_retry.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A marketplace document whose upload failed at least once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DocRetry {
    pub id: i64,
    pub doc_id: String,
    pub shop_id: String,
    pub times_failed: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocRetry {
    pub async fn find_retryable(pool: &PgPool, max_retries: i32) -> Result<Vec<DocRetry>, sqlx::Error> {
        let records = sqlx::query_as::<_, DocRetry>(
            "SELECT * FROM doc_retry WHERE times_failed <= $1 ORDER BY created_at ASC"
        )
        .bind(max_retries)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    pub async fn find_by_shop(pool: &PgPool, shop_id: &str) -> Result<Vec<DocRetry>, sqlx::Error> {
        let records = sqlx::query_as::<_, DocRetry>(
            "SELECT * FROM doc_retry WHERE shop_id = $1 ORDER BY created_at ASC"
        )
        .bind(shop_id)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Insert or bump the failure counter, then append the error to its history
    pub async fn record_failure(
        pool: &PgPool,
        doc_id: &str,
        shop_id: &str,
        error: &str,
    ) -> Result<DocRetry, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let record = sqlx::query_as::<_, DocRetry>(
            r#"
            INSERT INTO doc_retry (doc_id, shop_id, times_failed, created_at, updated_at)
            VALUES ($1, $2, 1, NOW(), NOW())
            ON CONFLICT (doc_id)
            DO UPDATE SET times_failed = doc_retry.times_failed + 1, updated_at = NOW()
            RETURNING *
            "#
        )
        .bind(doc_id)
        .bind(shop_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO doc_error (doc_retry_id, error, created_at) VALUES ($1, $2, NOW())")
            .bind(record.id)
            .bind(error)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record)
    }

    /// Errors cascade with the retry row
    pub async fn delete_by_doc_id(pool: &PgPool, doc_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM doc_retry WHERE doc_id = $1")
            .bind(doc_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
