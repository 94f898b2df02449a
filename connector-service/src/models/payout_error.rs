// connector-service/src/models/payout_error.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A payout that MarketPay rejected, kept with the request needed to replay it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdyenPayoutError {
    pub id: i64,
    pub account_holder_code: String,
    pub raw_request: String,
    pub raw_response: Option<String>,
    pub retry: i32,
    pub processing: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdyenPayoutError {
    pub async fn create(
        pool: &PgPool,
        account_holder_code: &str,
        raw_request: &str,
        raw_response: Option<&str>,
    ) -> Result<AdyenPayoutError, sqlx::Error> {
        let record = sqlx::query_as::<_, AdyenPayoutError>(
            r#"
            INSERT INTO adyen_payout_error (
                account_holder_code, raw_request, raw_response, retry, processing, created_at, updated_at
            )
            VALUES ($1, $2, $3, 0, FALSE, NOW(), NOW())
            RETURNING *
            "#
        )
        .bind(account_holder_code)
        .bind(raw_request)
        .bind(raw_response)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn find_retryable(pool: &PgPool, max_failed: i32) -> Result<Vec<AdyenPayoutError>, sqlx::Error> {
        let records = sqlx::query_as::<_, AdyenPayoutError>(
            r#"
            SELECT * FROM adyen_payout_error
            WHERE retry < $1 AND processing = FALSE
            ORDER BY created_at ASC
            "#
        )
        .bind(max_failed)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    pub async fn find_retryable_for_account_holder(
        pool: &PgPool,
        account_holder_code: &str,
        max_failed: i32,
    ) -> Result<Vec<AdyenPayoutError>, sqlx::Error> {
        let records = sqlx::query_as::<_, AdyenPayoutError>(
            r#"
            SELECT * FROM adyen_payout_error
            WHERE account_holder_code = $1 AND retry < $2 AND processing = FALSE
            ORDER BY created_at ASC
            "#
        )
        .bind(account_holder_code)
        .bind(max_failed)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Claim rows no other retry holds; returns the ids this caller now owns
    pub async fn mark_processing(pool: &PgPool, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE adyen_payout_error
            SET processing = TRUE, updated_at = NOW()
            WHERE id = ANY($1) AND processing = FALSE
            RETURNING id
            "#
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    pub async fn release(pool: &PgPool, ids: &[i64]) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE adyen_payout_error SET processing = FALSE, updated_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Bump the retry counter and release the row; a missing response keeps the previous one
    pub async fn record_failure(
        pool: &PgPool,
        id: i64,
        raw_response: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE adyen_payout_error
            SET retry = retry + 1,
                processing = FALSE,
                raw_response = COALESCE($2, raw_response),
                updated_at = NOW()
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(raw_response)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM adyen_payout_error WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
