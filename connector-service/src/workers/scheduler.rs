// connector-service/src/workers/scheduler.rs

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::services::document::DocumentService;
use crate::services::retry_payout::RetryPayoutService;
use crate::services::shop::ShopService;

/// Services driven by the cron jobs
pub struct SyncJobs {
    pub shops: Arc<ShopService>,
    pub documents: Arc<DocumentService>,
    pub retry_payouts: RetryPayoutService,
}

/// A cron job that skips a tick while its previous run is still going
pub fn guarded_job<F, Fut>(schedule: &str, name: &'static str, run: F) -> Result<Job, JobSchedulerError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let lock = Arc::new(Mutex::new(()));
    let run = Arc::new(run);

    Job::new_async(schedule, move |_uuid, _scheduler| {
        let lock = lock.clone();
        let run = run.clone();
        Box::pin(async move {
            let Ok(_guard) = lock.try_lock() else {
                warn!(job = name, "Previous run still active, skipping");
                return;
            };
            info!(job = name, "Job started");
            run().await;
        })
    })
}

pub async fn start(config: &SchedulerConfig, jobs: SyncJobs) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let shops = jobs.shops.clone();
    scheduler
        .add(guarded_job(&config.shop_sync_cron, "shop-sync", move || {
            let shops = shops.clone();
            async move {
                match shops.process_updated_shops().await {
                    Ok(count) => info!(count, "Shop sync finished"),
                    Err(e) => error!(error = %e, "Shop sync failed"),
                }
            }
        })?)
        .await?;

    let documents = jobs.documents.clone();
    scheduler
        .add(guarded_job(&config.doc_sync_cron, "document-sync", move || {
            let documents = documents.clone();
            async move {
                match documents.process_updated_documents().await {
                    Ok(count) => info!(count, "Document sync finished"),
                    Err(e) => error!(error = %e, "Document sync failed"),
                }
            }
        })?)
        .await?;

    let documents = jobs.documents;
    scheduler
        .add(guarded_job(&config.doc_retry_cron, "document-retry", move || {
            let documents = documents.clone();
            async move {
                match documents.retry_failed_documents().await {
                    Ok(count) => info!(count, "Document retry finished"),
                    Err(e) => error!(error = %e, "Document retry failed"),
                }
            }
        })?)
        .await?;

    let retry_payouts = jobs.retry_payouts;
    scheduler
        .add(guarded_job(&config.payout_retry_cron, "payout-retry", move || {
            let retry_payouts = retry_payouts.clone();
            async move {
                match retry_payouts.retry_failed_payouts().await {
                    Ok(count) => info!(count, "Payout retry finished"),
                    Err(e) => error!(error = %e, "Payout retry failed"),
                }
            }
        })?)
        .await?;

    scheduler.start().await?;
    info!(
        shop_sync = %config.shop_sync_cron,
        doc_sync = %config.doc_sync_cron,
        doc_retry = %config.doc_retry_cron,
        payout_retry = %config.payout_retry_cron,
        "Scheduler started"
    );
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_schedules_parse() {
        let config = Config::default().scheduler;
        for schedule in [
            &config.shop_sync_cron,
            &config.doc_sync_cron,
            &config.doc_retry_cron,
            &config.payout_retry_cron,
        ] {
            assert!(guarded_job(schedule, "test", || async {}).is_ok(), "{}", schedule);
        }
    }

    #[test]
    fn test_invalid_schedule_is_rejected() {
        assert!(guarded_job("every five minutes", "test", || async {}).is_err());
    }
}
