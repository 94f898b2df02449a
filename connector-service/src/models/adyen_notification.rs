use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Raw webhook body, held until the listener has processed it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdyenNotification {
    pub id: i64,
    pub raw_adyen_notification: String,
    pub created_at: DateTime<Utc>,
}

impl AdyenNotification {
    pub async fn create(pool: &PgPool, raw: &str) -> Result<AdyenNotification, sqlx::Error> {
        let record = sqlx::query_as::<_, AdyenNotification>(
            "INSERT INTO adyen_notification (raw_adyen_notification, created_at) VALUES ($1, NOW()) RETURNING *"
        )
        .bind(raw)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<AdyenNotification>, sqlx::Error> {
        let record = sqlx::query_as::<_, AdyenNotification>("SELECT * FROM adyen_notification WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(record)
    }

    pub async fn find_pending_ids(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM adyen_notification ORDER BY id ASC")
            .fetch_all(pool)
            .await?;

        Ok(ids)
    }

    pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM adyen_notification WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
