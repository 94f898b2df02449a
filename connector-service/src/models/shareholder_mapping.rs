// connector-service/src/models/shareholder_mapping.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Links a shop's UBO slot to the shareholder code MarketPay assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ShareholderMapping {
    pub id: i64,
    pub mirakl_shop_id: String,
    pub mirakl_ubo_number: i32,
    pub adyen_shareholder_code: String,
}

impl ShareholderMapping {
    pub async fn find_by_shop_and_ubo(
        pool: &PgPool,
        shop_id: &str,
        ubo_number: i32,
    ) -> Result<Option<ShareholderMapping>, sqlx::Error> {
        let record = sqlx::query_as::<_, ShareholderMapping>(
            "SELECT * FROM shareholder_mapping WHERE mirakl_shop_id = $1 AND mirakl_ubo_number = $2"
        )
        .bind(shop_id)
        .bind(ubo_number)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_shareholder_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<ShareholderMapping>, sqlx::Error> {
        let record = sqlx::query_as::<_, ShareholderMapping>(
            "SELECT * FROM shareholder_mapping WHERE adyen_shareholder_code = $1"
        )
        .bind(code)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    pub async fn create(
        pool: &PgPool,
        shop_id: &str,
        ubo_number: i32,
        code: &str,
    ) -> Result<ShareholderMapping, sqlx::Error> {
        let record = sqlx::query_as::<_, ShareholderMapping>(
            r#"
            INSERT INTO shareholder_mapping (mirakl_shop_id, mirakl_ubo_number, adyen_shareholder_code)
            VALUES ($1, $2, $3)
            ON CONFLICT (mirakl_shop_id, mirakl_ubo_number)
            DO UPDATE SET adyen_shareholder_code = EXCLUDED.adyen_shareholder_code
            RETURNING *
            "#
        )
        .bind(shop_id)
        .bind(ubo_number)
        .bind(code)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }
}
