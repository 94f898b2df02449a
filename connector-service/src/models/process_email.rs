// connector-service/src/models/process_email.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

pub const EMAIL_TO_SEND: &str = "TO_SEND";
pub const EMAIL_SENT: &str = "SENT";
pub const EMAIL_FAILED: &str = "FAILED";

/// Queued outgoing email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProcessEmail {
    pub id: i64,
    pub to_address: String,
    pub subject: String,
    pub content: String,
    pub multipart: bool,
    pub html: bool,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEmail {
    pub to_address: String,
    pub subject: String,
    pub content: String,
    pub multipart: bool,
    pub html: bool,
}

impl ProcessEmail {
    pub async fn create(pool: &PgPool, email: &NewEmail) -> Result<ProcessEmail, sqlx::Error> {
        let record = sqlx::query_as::<_, ProcessEmail>(
            r#"
            INSERT INTO process_email (to_address, subject, content, multipart, html, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING *
            "#
        )
        .bind(&email.to_address)
        .bind(&email.subject)
        .bind(&email.content)
        .bind(email.multipart)
        .bind(email.html)
        .bind(EMAIL_TO_SEND)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_state(pool: &PgPool, state: &str) -> Result<Vec<ProcessEmail>, sqlx::Error> {
        let records = sqlx::query_as::<_, ProcessEmail>(
            "SELECT * FROM process_email WHERE state = $1 ORDER BY created_at ASC"
        )
        .bind(state)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    pub async fn update_state(pool: &PgPool, id: i64, state: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE process_email SET state = $1, updated_at = NOW() WHERE id = $2")
            .bind(state)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Append a send error and return how many the email has collected
    pub async fn add_error(pool: &PgPool, id: i64, error: &str) -> Result<i64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO email_error (process_email_id, error, created_at) VALUES ($1, $2, NOW())")
            .bind(id)
            .bind(error)
            .execute(&mut *tx)
            .await?;

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_error WHERE process_email_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(count)
    }
}
