//! Persistence seams used by the services
//!
//! Each trait covers one table family so services can be tested against mocks;
//! `PgRepository` implements all of them on top of the row models.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    AdyenNotification, AdyenPayoutError, DocRetry, MiraklDelta, MiraklDocumentDelta, NewEmail, ProcessEmail,
    ShareholderMapping, EMAIL_TO_SEND,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeltaRepository: Send + Sync {
    async fn latest_shop_delta(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error>;
    async fn save_shop_delta(&self, delta: DateTime<Utc>) -> Result<(), sqlx::Error>;
    async fn latest_document_delta(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error>;
    async fn save_document_delta(&self, delta: DateTime<Utc>) -> Result<(), sqlx::Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShareholderMappingRepository: Send + Sync {
    async fn find_by_shop_and_ubo(
        &self,
        shop_id: &str,
        ubo_number: i32,
    ) -> Result<Option<ShareholderMapping>, sqlx::Error>;
    async fn find_by_shareholder_code(&self, code: &str) -> Result<Option<ShareholderMapping>, sqlx::Error>;
    async fn save(&self, shop_id: &str, ubo_number: i32, code: &str) -> Result<ShareholderMapping, sqlx::Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocRetryRepository: Send + Sync {
    async fn find_retryable(&self, max_retries: i32) -> Result<Vec<DocRetry>, sqlx::Error>;
    async fn find_by_shop(&self, shop_id: &str) -> Result<Vec<DocRetry>, sqlx::Error>;
    async fn record_failure(&self, doc_id: &str, shop_id: &str, error: &str) -> Result<DocRetry, sqlx::Error>;
    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64, sqlx::Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutErrorRepository: Send + Sync {
    async fn create(
        &self,
        account_holder_code: &str,
        raw_request: &str,
        raw_response: Option<String>,
    ) -> Result<AdyenPayoutError, sqlx::Error>;
    async fn find_retryable(&self, max_failed: i32) -> Result<Vec<AdyenPayoutError>, sqlx::Error>;
    async fn find_retryable_for_account_holder(
        &self,
        account_holder_code: &str,
        max_failed: i32,
    ) -> Result<Vec<AdyenPayoutError>, sqlx::Error>;
    async fn mark_processing(&self, ids: Vec<i64>) -> Result<Vec<i64>, sqlx::Error>;
    async fn release(&self, ids: Vec<i64>) -> Result<(), sqlx::Error>;
    async fn record_failure(&self, id: i64, raw_response: Option<String>) -> Result<(), sqlx::Error>;
    async fn delete(&self, id: i64) -> Result<(), sqlx::Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, raw: &str) -> Result<i64, sqlx::Error>;
    async fn find_by_id(&self, id: i64) -> Result<Option<AdyenNotification>, sqlx::Error>;
    async fn pending_ids(&self) -> Result<Vec<i64>, sqlx::Error>;
    async fn delete(&self, id: i64) -> Result<(), sqlx::Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailRepository: Send + Sync {
    async fn enqueue(&self, email: NewEmail) -> Result<ProcessEmail, sqlx::Error>;
    async fn find_to_send(&self) -> Result<Vec<ProcessEmail>, sqlx::Error>;
    async fn update_state(&self, id: i64, state: &str) -> Result<(), sqlx::Error>;
    async fn add_error(&self, id: i64, error: &str) -> Result<i64, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeltaRepository for PgRepository {
    async fn latest_shop_delta(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        Ok(MiraklDelta::find_latest(&self.pool).await?.map(|d| d.shop_delta))
    }

    async fn save_shop_delta(&self, delta: DateTime<Utc>) -> Result<(), sqlx::Error> {
        MiraklDelta::create(&self.pool, delta).await?;
        Ok(())
    }

    async fn latest_document_delta(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        Ok(MiraklDocumentDelta::find_latest(&self.pool)
            .await?
            .map(|d| d.document_delta))
    }

    async fn save_document_delta(&self, delta: DateTime<Utc>) -> Result<(), sqlx::Error> {
        MiraklDocumentDelta::create(&self.pool, delta).await?;
        Ok(())
    }
}

#[async_trait]
impl ShareholderMappingRepository for PgRepository {
    async fn find_by_shop_and_ubo(
        &self,
        shop_id: &str,
        ubo_number: i32,
    ) -> Result<Option<ShareholderMapping>, sqlx::Error> {
        ShareholderMapping::find_by_shop_and_ubo(&self.pool, shop_id, ubo_number).await
    }

    async fn find_by_shareholder_code(&self, code: &str) -> Result<Option<ShareholderMapping>, sqlx::Error> {
        ShareholderMapping::find_by_shareholder_code(&self.pool, code).await
    }

    async fn save(&self, shop_id: &str, ubo_number: i32, code: &str) -> Result<ShareholderMapping, sqlx::Error> {
        ShareholderMapping::create(&self.pool, shop_id, ubo_number, code).await
    }
}

#[async_trait]
impl DocRetryRepository for PgRepository {
    async fn find_retryable(&self, max_retries: i32) -> Result<Vec<DocRetry>, sqlx::Error> {
        DocRetry::find_retryable(&self.pool, max_retries).await
    }

    async fn find_by_shop(&self, shop_id: &str) -> Result<Vec<DocRetry>, sqlx::Error> {
        DocRetry::find_by_shop(&self.pool, shop_id).await
    }

    async fn record_failure(&self, doc_id: &str, shop_id: &str, error: &str) -> Result<DocRetry, sqlx::Error> {
        DocRetry::record_failure(&self.pool, doc_id, shop_id, error).await
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<u64, sqlx::Error> {
        DocRetry::delete_by_doc_id(&self.pool, doc_id).await
    }
}

#[async_trait]
impl PayoutErrorRepository for PgRepository {
    async fn create(
        &self,
        account_holder_code: &str,
        raw_request: &str,
        raw_response: Option<String>,
    ) -> Result<AdyenPayoutError, sqlx::Error> {
        AdyenPayoutError::create(&self.pool, account_holder_code, raw_request, raw_response.as_deref()).await
    }

    async fn find_retryable(&self, max_failed: i32) -> Result<Vec<AdyenPayoutError>, sqlx::Error> {
        AdyenPayoutError::find_retryable(&self.pool, max_failed).await
    }

    async fn find_retryable_for_account_holder(
        &self,
        account_holder_code: &str,
        max_failed: i32,
    ) -> Result<Vec<AdyenPayoutError>, sqlx::Error> {
        AdyenPayoutError::find_retryable_for_account_holder(&self.pool, account_holder_code, max_failed).await
    }

    async fn mark_processing(&self, ids: Vec<i64>) -> Result<Vec<i64>, sqlx::Error> {
        AdyenPayoutError::mark_processing(&self.pool, &ids).await
    }

    async fn release(&self, ids: Vec<i64>) -> Result<(), sqlx::Error> {
        AdyenPayoutError::release(&self.pool, &ids).await
    }

    async fn record_failure(&self, id: i64, raw_response: Option<String>) -> Result<(), sqlx::Error> {
        AdyenPayoutError::record_failure(&self.pool, id, raw_response.as_deref()).await
    }

    async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        AdyenPayoutError::delete(&self.pool, id).await
    }
}

#[async_trait]
impl NotificationRepository for PgRepository {
    async fn create(&self, raw: &str) -> Result<i64, sqlx::Error> {
        Ok(AdyenNotification::create(&self.pool, raw).await?.id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AdyenNotification>, sqlx::Error> {
        AdyenNotification::find_by_id(&self.pool, id).await
    }

    async fn pending_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        AdyenNotification::find_pending_ids(&self.pool).await
    }

    async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        AdyenNotification::delete(&self.pool, id).await
    }
}

#[async_trait]
impl EmailRepository for PgRepository {
    async fn enqueue(&self, email: NewEmail) -> Result<ProcessEmail, sqlx::Error> {
        ProcessEmail::create(&self.pool, &email).await
    }

    async fn find_to_send(&self) -> Result<Vec<ProcessEmail>, sqlx::Error> {
        ProcessEmail::find_by_state(&self.pool, EMAIL_TO_SEND).await
    }

    async fn update_state(&self, id: i64, state: &str) -> Result<(), sqlx::Error> {
        ProcessEmail::update_state(&self.pool, id, state).await
    }

    async fn add_error(&self, id: i64, error: &str) -> Result<i64, sqlx::Error> {
        ProcessEmail::add_error(&self.pool, id, error).await
    }
}
