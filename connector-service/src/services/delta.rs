use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::repository::DeltaRepository;

/// Sync watermarks; shops and documents advance independently
#[derive(Clone)]
pub struct DeltaService {
    repository: Arc<dyn DeltaRepository>,
}

impl DeltaService {
    pub fn new(repository: Arc<dyn DeltaRepository>) -> Self {
        Self { repository }
    }

    /// `None` until the first successful run, which then fetches everything
    pub async fn get_shop_delta(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        self.repository.latest_shop_delta().await
    }

    pub async fn update_shop_delta(&self, before: DateTime<Utc>) -> Result<(), sqlx::Error> {
        debug!(delta = %before, "Updating shop delta");
        self.repository.save_shop_delta(before).await
    }

    pub async fn get_document_delta(&self) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        self.repository.latest_document_delta().await
    }

    pub async fn update_document_delta(&self, before: DateTime<Utc>) -> Result<(), sqlx::Error> {
        debug!(delta = %before, "Updating document delta");
        self.repository.save_document_delta(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockDeltaRepository;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_shop_and_document_deltas_are_independent() {
        let shop = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        let doc = Utc.with_ymd_and_hms(2018, 2, 1, 0, 0, 0).unwrap();

        let mut repository = MockDeltaRepository::new();
        repository
            .expect_latest_shop_delta()
            .returning(move || Ok(Some(shop)));
        repository.expect_latest_document_delta().returning(|| Ok(None));
        repository
            .expect_save_document_delta()
            .with(eq(doc))
            .times(1)
            .returning(|_| Ok(()));
        repository.expect_save_shop_delta().never();

        let service = DeltaService::new(Arc::new(repository));
        assert_eq!(service.get_shop_delta().await.unwrap(), Some(shop));
        assert_eq!(service.get_document_delta().await.unwrap(), None);
        service.update_document_delta(doc).await.unwrap();
    }
}
