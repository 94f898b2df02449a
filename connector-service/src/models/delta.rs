// connector-service/src/models/delta.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Watermark of the last successful shop sync
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MiraklDelta {
    pub id: i64,
    pub shop_delta: DateTime<Utc>,
}

impl MiraklDelta {
    pub async fn find_latest(pool: &PgPool) -> Result<Option<MiraklDelta>, sqlx::Error> {
        let record = sqlx::query_as::<_, MiraklDelta>(
            "SELECT * FROM mirakl_delta ORDER BY shop_delta DESC LIMIT 1"
        )
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    pub async fn create(pool: &PgPool, shop_delta: DateTime<Utc>) -> Result<MiraklDelta, sqlx::Error> {
        let record = sqlx::query_as::<_, MiraklDelta>(
            "INSERT INTO mirakl_delta (shop_delta) VALUES ($1) RETURNING *"
        )
        .bind(shop_delta)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }
}

/// Watermark of the last successful document sync
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MiraklDocumentDelta {
    pub id: i64,
    pub document_delta: DateTime<Utc>,
}

impl MiraklDocumentDelta {
    pub async fn find_latest(pool: &PgPool) -> Result<Option<MiraklDocumentDelta>, sqlx::Error> {
        let record = sqlx::query_as::<_, MiraklDocumentDelta>(
            "SELECT * FROM mirakl_document_delta ORDER BY document_delta DESC LIMIT 1"
        )
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    pub async fn create(
        pool: &PgPool,
        document_delta: DateTime<Utc>,
    ) -> Result<MiraklDocumentDelta, sqlx::Error> {
        let record = sqlx::query_as::<_, MiraklDocumentDelta>(
            "INSERT INTO mirakl_document_delta (document_delta) VALUES ($1) RETURNING *"
        )
        .bind(document_delta)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }
}
