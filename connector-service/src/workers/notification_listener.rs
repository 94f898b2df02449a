use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

use crate::repository::NotificationRepository;
use crate::services::notification::NotificationService;

/// Re-publish rows that an earlier run stored but never processed
pub async fn requeue_pending(
    notifications: &dyn NotificationRepository,
    tx: &UnboundedSender<i64>,
) -> Result<usize, sqlx::Error> {
    let pending = notifications.pending_ids().await?;
    let count = pending.len();
    for id in pending {
        if tx.send(id).is_err() {
            break;
        }
    }

    if count > 0 {
        info!(count, "Requeued pending notifications");
    }
    Ok(count)
}

pub struct NotificationListener {
    service: Arc<NotificationService>,
}

impl NotificationListener {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }

    /// Handle ids one at a time until every sender is gone
    pub async fn run(&self, mut rx: UnboundedReceiver<i64>) {
        info!("Starting notification listener...");

        while let Some(id) = rx.recv().await {
            if let Err(e) = self.service.handle(id).await {
                error!(id, error = %e, "Error handling notification");
            }
        }

        info!("Notification listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockNotificationRepository;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_pending_rows_are_requeued_in_order() {
        let mut notifications = MockNotificationRepository::new();
        notifications.expect_pending_ids().returning(|| Ok(vec![3, 5, 8]));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let count = tokio_test::assert_ok!(requeue_pending(&notifications, &tx).await);
        assert_eq!(count, 3);

        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(5));
        assert_eq!(rx.recv().await, Some(8));
    }
}
