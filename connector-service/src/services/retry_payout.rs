use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::AdyenApi;
use crate::models::adyen::PayoutAccountHolderRequest;
use crate::models::AdyenPayoutError;
use crate::repository::PayoutErrorRepository;

/// Replays payouts that MarketPay rejected, until `max_payout_failed` attempts
#[derive(Clone)]
pub struct RetryPayoutService {
    adyen: Arc<dyn AdyenApi>,
    errors: Arc<dyn PayoutErrorRepository>,
    max_payout_failed: i32,
}

impl RetryPayoutService {
    pub fn new(adyen: Arc<dyn AdyenApi>, errors: Arc<dyn PayoutErrorRepository>, max_payout_failed: i32) -> Self {
        Self {
            adyen,
            errors,
            max_payout_failed,
        }
    }

    pub async fn retry_failed_payouts(&self) -> Result<usize, sqlx::Error> {
        let failed = self.errors.find_retryable(self.max_payout_failed).await?;
        if failed.is_empty() {
            info!("No failed payouts found");
            return Ok(0);
        }

        self.process_failed_payouts(failed).await
    }

    pub async fn retry_failed_payouts_for_account_holder(&self, account_holder_code: &str) -> Result<usize, sqlx::Error> {
        let failed = self
            .errors
            .find_retryable_for_account_holder(account_holder_code, self.max_payout_failed)
            .await?;
        if failed.is_empty() {
            info!("No failed payouts found for this accountHolder {}", account_holder_code);
            return Ok(0);
        }

        self.process_failed_payouts(failed).await
    }

    /// Returns the number of payouts that went through on this attempt.
    /// Only rows this call manages to claim are replayed; storage errors on one row do not stop the rest.
    pub async fn process_failed_payouts(&self, failed: Vec<AdyenPayoutError>) -> Result<usize, sqlx::Error> {
        let claimed: HashSet<i64> = self
            .errors
            .mark_processing(failed.iter().map(|row| row.id).collect())
            .await?
            .into_iter()
            .collect();

        if claimed.len() < failed.len() {
            warn!(
                skipped = failed.len() - claimed.len(),
                "Failed payouts already claimed by another retry"
            );
        }
        let failed: Vec<AdyenPayoutError> = failed.into_iter().filter(|row| claimed.contains(&row.id)).collect();
        info!(count = failed.len(), "Retrying failed payouts");

        let mut succeeded = 0;
        let mut stuck = Vec::new();
        for row in failed {
            let raw_response = match serde_json::from_str::<PayoutAccountHolderRequest>(&row.raw_request) {
                Ok(request) => match self.adyen.payout_account_holder(request).await {
                    Ok(response) => {
                        info!(
                            id = row.id,
                            account_holder_code = %row.account_holder_code,
                            psp_reference = ?response.psp_reference,
                            "Payout retry succeeded"
                        );
                        succeeded += 1;
                        // a row left claimed here is never paid out again
                        if let Err(e) = self.errors.delete(row.id).await {
                            error!(id = row.id, error = %e, "Failed to delete retried payout");
                        }
                        continue;
                    }
                    Err(e) => {
                        error!(
                            id = row.id,
                            account_holder_code = %row.account_holder_code,
                            retry = row.retry + 1,
                            error = %e,
                            "Payout retry failed"
                        );
                        e.raw_response()
                    }
                },
                Err(e) => {
                    warn!(id = row.id, error = %e, "Stored payout request is unreadable");
                    None
                }
            };

            if let Err(e) = self.errors.record_failure(row.id, raw_response).await {
                error!(id = row.id, error = %e, "Failed to store payout retry failure");
                stuck.push(row.id);
            }
        }

        if !stuck.is_empty() {
            self.errors.release(stuck).await?;
        }

        Ok(succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::adyen::MockAdyenApi;
    use crate::clients::AdyenError;
    use crate::models::adyen::{Amount, PayoutAccountHolderResponse};
    use crate::repository::MockPayoutErrorRepository;
    use chrono::Utc;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn row(id: i64, account_holder_code: &str) -> AdyenPayoutError {
        let request = PayoutAccountHolderRequest {
            account_code: "8815".to_string(),
            account_holder_code: account_holder_code.to_string(),
            amount: Amount {
                currency: "EUR".to_string(),
                value: 1025 * id,
            },
            bank_account_uuid: "uuid-1".to_string(),
            description: None,
        };
        AdyenPayoutError {
            id,
            account_holder_code: account_holder_code.to_string(),
            raw_request: serde_json::to_string(&request).unwrap(),
            raw_response: None,
            retry: 1,
            processing: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_no_failed_payouts() {
        let mut errors = MockPayoutErrorRepository::new();
        errors.expect_find_retryable().with(eq(5)).returning(|_| Ok(vec![]));
        errors.expect_mark_processing().never();

        let service = RetryPayoutService::new(Arc::new(MockAdyenApi::new()), Arc::new(errors), 5);
        assert_eq!(service.retry_failed_payouts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rows_are_claimed_before_replay() {
        let mut seq = Sequence::new();
        let mut errors = MockPayoutErrorRepository::new();
        let mut adyen = MockAdyenApi::new();

        errors
            .expect_mark_processing()
            .with(eq(vec![1, 2]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ids| Ok(ids));
        adyen
            .expect_payout_account_holder()
            .withf(|request| request.amount.value == 1025)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PayoutAccountHolderResponse::default()));
        errors
            .expect_delete()
            .with(eq(1))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        adyen
            .expect_payout_account_holder()
            .withf(|request| request.amount.value == 2050)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(AdyenError::Api {
                    status: 422,
                    error_code: "10_001".to_string(),
                    message: "Invalid".to_string(),
                    error_type: "validation".to_string(),
                })
            });
        errors
            .expect_record_failure()
            .withf(|id, raw| *id == 2 && raw.as_deref().map_or(false, |r| r.contains("10_001")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let service = RetryPayoutService::new(Arc::new(adyen), Arc::new(errors), 5);
        let succeeded = service
            .process_failed_payouts(vec![row(1, "2012"), row(2, "2012")])
            .await
            .unwrap();
        assert_eq!(succeeded, 1);
    }

    #[tokio::test]
    async fn test_retry_for_account_holder() {
        let mut errors = MockPayoutErrorRepository::new();
        errors
            .expect_find_retryable_for_account_holder()
            .with(eq("2012"), eq(5))
            .returning(|code, _| Ok(vec![row(3, code)]));
        errors.expect_mark_processing().returning(|ids| Ok(ids));
        errors.expect_delete().with(eq(3)).times(1).returning(|_| Ok(()));

        let mut adyen = MockAdyenApi::new();
        adyen
            .expect_payout_account_holder()
            .returning(|_| Ok(PayoutAccountHolderResponse::default()));

        let service = RetryPayoutService::new(Arc::new(adyen), Arc::new(errors), 5);
        assert_eq!(service.retry_failed_payouts_for_account_holder("2012").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_request_counts_as_failure() {
        let mut broken = row(4, "2012");
        broken.raw_request = "not json".to_string();

        let mut errors = MockPayoutErrorRepository::new();
        errors.expect_mark_processing().returning(|ids| Ok(ids));
        errors
            .expect_record_failure()
            .with(eq(4), eq(None::<String>))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut adyen = MockAdyenApi::new();
        adyen.expect_payout_account_holder().never();

        let service = RetryPayoutService::new(Arc::new(adyen), Arc::new(errors), 5);
        assert_eq!(service.process_failed_payouts(vec![broken]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rows_claimed_elsewhere_are_not_replayed() {
        let mut errors = MockPayoutErrorRepository::new();
        errors
            .expect_mark_processing()
            .with(eq(vec![1, 2]))
            .times(1)
            .returning(|_| Ok(vec![2]));
        errors.expect_delete().with(eq(2)).times(1).returning(|_| Ok(()));

        let mut adyen = MockAdyenApi::new();
        adyen
            .expect_payout_account_holder()
            .withf(|request| request.amount.value == 2050)
            .times(1)
            .returning(|_| Ok(PayoutAccountHolderResponse::default()));

        let service = RetryPayoutService::new(Arc::new(adyen), Arc::new(errors), 5);
        let succeeded = service
            .process_failed_payouts(vec![row(1, "2012"), row(2, "2012")])
            .await
            .unwrap();
        assert_eq!(succeeded, 1);
    }

    #[tokio::test]
    async fn test_storage_error_does_not_stop_remaining_rows() {
        let mut errors = MockPayoutErrorRepository::new();
        errors.expect_mark_processing().returning(|ids| Ok(ids));
        errors
            .expect_record_failure()
            .withf(|id, raw| *id == 1 && raw.is_some())
            .times(1)
            .returning(|_, _| Err(sqlx::Error::PoolTimedOut));
        errors.expect_delete().with(eq(2)).times(1).returning(|_| Ok(()));
        errors
            .expect_release()
            .with(eq(vec![1]))
            .times(1)
            .returning(|_| Ok(()));

        let mut adyen = MockAdyenApi::new();
        adyen
            .expect_payout_account_holder()
            .withf(|request| request.amount.value == 1025)
            .times(1)
            .returning(|_| {
                Err(AdyenError::Api {
                    status: 500,
                    error_code: "000".to_string(),
                    message: "down".to_string(),
                    error_type: "internal".to_string(),
                })
            });
        adyen
            .expect_payout_account_holder()
            .withf(|request| request.amount.value == 2050)
            .times(1)
            .returning(|_| Ok(PayoutAccountHolderResponse::default()));

        let service = RetryPayoutService::new(Arc::new(adyen), Arc::new(errors), 5);
        let succeeded = service
            .process_failed_payouts(vec![row(1, "2012"), row(2, "2012")])
            .await
            .unwrap();
        assert_eq!(succeeded, 1);
    }
}
