use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::services::mail::EmailSender;

pub struct EmailSenderWorker {
    sender: Arc<EmailSender>,
    check_interval_seconds: u64,
}

impl EmailSenderWorker {
    pub fn new(sender: Arc<EmailSender>, check_interval_seconds: u64) -> Self {
        Self {
            sender,
            check_interval_seconds,
        }
    }

    pub async fn run(&self) {
        info!("Starting email sender worker...");
        let mut ticker = interval(Duration::from_secs(self.check_interval_seconds.max(1)));

        loop {
            ticker.tick().await;

            match self.sender.send_pending().await {
                Ok(0) => {}
                Ok(sent) => info!(sent, "Sent queued emails"),
                Err(e) => error!(error = %e, "Error sending queued emails"),
            }
        }
    }
}
