//! Reacts to MarketPay notifications stored by the webhook handler

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::{AdyenApi, AdyenError, MiraklApi, MiraklError};
use crate::models::mirakl::{GetShopsRequest, Shop};
use crate::models::notification::{
    Notification, NotificationContent, ACCOUNT_HOLDER_CREATED, ACCOUNT_HOLDER_PAYOUT, ACCOUNT_HOLDER_STATUS_CHANGE,
    ACCOUNT_HOLDER_UPDATED, ACCOUNT_HOLDER_VERIFICATION, COMPENSATE_NEGATIVE_BALANCE, TRANSFER_FUNDS,
};
use crate::repository::NotificationRepository;
use crate::services::document::{DocumentError, DocumentService};
use crate::services::mail::{
    MailError, MailTemplateService, AWAITING_DATA_TEMPLATE, AWAITING_DATA_TITLE, BANK_ACCOUNT_VERIFICATION_TEMPLATE,
    BANK_ACCOUNT_VERIFICATION_TITLE, PAYOUT_FAILED_TEMPLATE, PAYOUT_FAILED_TITLE, TRANSFER_FUND_FAILED_TEMPLATE,
    TRANSFER_FUND_FAILED_TITLE, VALIDATION_TEMPLATE, VALIDATION_TITLE,
};
use crate::services::retry_payout::RetryPayoutService;
use crate::services::shop::ShopService;

pub const RETRY_LIMIT_REACHED: &str = "RETRY_LIMIT_REACHED";
pub const AWAITING_DATA: &str = "AWAITING_DATA";
pub const INVALID_DATA: &str = "INVALID_DATA";

pub const BANK_ACCOUNT_VERIFICATION: &str = "BANK_ACCOUNT_VERIFICATION";
pub const IDENTITY_VERIFICATION: &str = "IDENTITY_VERIFICATION";
pub const PASSPORT_VERIFICATION: &str = "PASSPORT_VERIFICATION";

const FAILED: &str = "Failed";

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Invalid notification: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Mirakl error: {0}")]
    Mirakl(#[from] MiraklError),

    #[error("Adyen error: {0}")]
    Adyen(#[from] AdyenError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Notification has no account holder code")]
    MissingAccountHolder,

    #[error("Cannot find shop: {0}")]
    ShopNotFound(String),

    #[error("Cannot find shareholder {shareholder_code} for account holder {account_holder_code}")]
    ShareholderNotFound {
        account_holder_code: String,
        shareholder_code: String,
    },
}

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    mirakl: Arc<dyn MiraklApi>,
    adyen: Arc<dyn AdyenApi>,
    mail: Arc<MailTemplateService>,
    documents: Arc<DocumentService>,
    shops: Arc<ShopService>,
    retry_payouts: RetryPayoutService,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        mirakl: Arc<dyn MiraklApi>,
        adyen: Arc<dyn AdyenApi>,
        mail: Arc<MailTemplateService>,
        documents: Arc<DocumentService>,
        shops: Arc<ShopService>,
        retry_payouts: RetryPayoutService,
    ) -> Self {
        Self {
            notifications,
            mirakl,
            adyen,
            mail,
            documents,
            shops,
            retry_payouts,
        }
    }

    /// Load a stored notification, act on it, then drop the row.
    /// Rows that fail to parse or process are dropped as well; only storage errors keep them.
    pub async fn handle(&self, id: i64) -> Result<(), sqlx::Error> {
        let Some(stored) = self.notifications.find_by_id(id).await? else {
            debug!(id, "Notification already handled");
            return Ok(());
        };

        let result = match serde_json::from_str::<Notification>(&stored.raw_adyen_notification) {
            Ok(notification) => self.process(&notification).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => debug!(id, "Notification processed"),
            Err(NotificationError::Database(e)) => return Err(e),
            Err(e) => error!(id, error = %e, "Failed to process notification"),
        }

        self.notifications.delete(id).await
    }

    pub async fn process(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            event_type = %notification.event_type,
            psp_reference = ?notification.psp_reference,
            "Processing notification"
        );
        let content = &notification.content;

        match notification.event_type.as_str() {
            ACCOUNT_HOLDER_VERIFICATION => self.process_account_holder_verification(content).await,
            ACCOUNT_HOLDER_STATUS_CHANGE => self.process_account_holder_status_change(content).await,
            ACCOUNT_HOLDER_CREATED | ACCOUNT_HOLDER_UPDATED => self.process_account_holder_validation(content).await,
            ACCOUNT_HOLDER_PAYOUT => self.process_account_holder_payout(content).await,
            TRANSFER_FUNDS => self.process_transfer_funds(content).await,
            COMPENSATE_NEGATIVE_BALANCE => {
                self.process_compensate_negative_balance(content, notification.psp_reference.as_deref())
                    .await
            }
            other => {
                info!(event_type = %other, "Ignoring notification");
                Ok(())
            }
        }
    }

    async fn get_shop(&self, shop_id: &str) -> Result<Shop, NotificationError> {
        let shops = self
            .mirakl
            .get_shops(GetShopsRequest {
                shop_ids: vec![shop_id.to_string()],
                paginate: false,
                ..Default::default()
            })
            .await?;

        shops
            .shops
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::ShopNotFound(shop_id.to_string()))
    }

    async fn process_account_holder_verification(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        let code = content
            .account_holder_code
            .as_deref()
            .ok_or(NotificationError::MissingAccountHolder)?;
        let status = content.verification_status.as_deref().unwrap_or_default();
        let verification_type = content.verification_type.as_deref().unwrap_or_default();
        let shareholder_code = content.shareholder_code.as_deref();
        let identity_check = matches!(verification_type, IDENTITY_VERIFICATION | PASSPORT_VERIFICATION);

        if status == RETRY_LIMIT_REACHED && verification_type == BANK_ACCOUNT_VERIFICATION {
            let shop = self.get_shop(code).await?;
            self.mail
                .send_shop_email(
                    &shop,
                    BANK_ACCOUNT_VERIFICATION_TEMPLATE,
                    BANK_ACCOUNT_VERIFICATION_TITLE,
                    Value::Null,
                )
                .await?;
        }

        // the media removal below runs even when the email cannot be sent
        let notified = match shareholder_code {
            Some(shareholder_code) if matches!(status, AWAITING_DATA | INVALID_DATA) && identity_check => {
                self.send_awaiting_data_email(code, shareholder_code).await
            }
            _ => Ok(()),
        };

        if status == INVALID_DATA {
            let removed = match (verification_type, shareholder_code) {
                (BANK_ACCOUNT_VERIFICATION, _) => self.documents.remove_mirakl_media_for_bank_proof(code).await?,
                (_, Some(shareholder_code)) if identity_check => {
                    self.documents
                        .remove_mirakl_media_for_shareholder(shareholder_code)
                        .await?
                }
                (_, None) if identity_check => self.documents.remove_mirakl_media_for_individual(code).await?,
                _ => 0,
            };
            debug!(account_holder_code = %code, removed, "Removed invalid marketplace media");
        }

        notified
    }

    async fn send_awaiting_data_email(&self, code: &str, shareholder_code: &str) -> Result<(), NotificationError> {
        let holder = self.adyen.get_account_holder(code).await?;
        let shareholder = holder
            .account_holder_details
            .shareholders()
            .iter()
            .find(|shareholder| shareholder.shareholder_code.as_deref() == Some(shareholder_code))
            .ok_or_else(|| NotificationError::ShareholderNotFound {
                account_holder_code: code.to_string(),
                shareholder_code: shareholder_code.to_string(),
            })?;

        self.mail
            .send_shareholder_email(shareholder, code, AWAITING_DATA_TEMPLATE, AWAITING_DATA_TITLE)
            .await?;
        Ok(())
    }

    async fn process_account_holder_status_change(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        let code = content
            .account_holder_code
            .as_deref()
            .ok_or(NotificationError::MissingAccountHolder)?;
        let was_allowed = content.old_status.as_ref().map_or(false, |status| status.allow_payout());
        let now_allowed = content.new_status.as_ref().map_or(false, |status| status.allow_payout());

        if !was_allowed && now_allowed {
            info!(account_holder_code = %code, "Payouts allowed again, retrying failed payouts");
            self.retry_payouts.retry_failed_payouts_for_account_holder(code).await?;
        }
        Ok(())
    }

    async fn process_account_holder_validation(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        if content.invalid_fields.is_empty() {
            return Ok(());
        }
        let code = content
            .account_holder_code
            .as_deref()
            .ok_or(NotificationError::MissingAccountHolder)?;

        let invalid_fields: Vec<String> = content
            .invalid_fields
            .iter()
            .filter_map(|field| field.error_description.clone())
            .collect();
        warn!(account_holder_code = %code, ?invalid_fields, "Account holder has invalid fields");

        let shop = self.get_shop(code).await?;
        self.mail
            .send_shop_email(
                &shop,
                VALIDATION_TEMPLATE,
                VALIDATION_TITLE,
                json!({ "invalidFields": invalid_fields }),
            )
            .await?;
        Ok(())
    }

    async fn process_account_holder_payout(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        if content.status_code() != Some(FAILED) {
            return Ok(());
        }
        let code = content
            .account_holder_code
            .as_deref()
            .ok_or(NotificationError::MissingAccountHolder)?;

        let shop = self.get_shop(code).await?;
        self.mail
            .send_shop_email(
                &shop,
                PAYOUT_FAILED_TEMPLATE,
                PAYOUT_FAILED_TITLE,
                json!({ "reason": status_message(content) }),
            )
            .await?;
        Ok(())
    }

    async fn process_transfer_funds(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        if content.status_code() != Some(FAILED) {
            return Ok(());
        }

        let context = json!({
            "sourceAccountCode": content.source_account_code,
            "destinationAccountCode": content.destination_account_code,
            "amount": content.amount.as_ref().map(|amount| amount.value),
            "currency": content.amount.as_ref().map(|amount| amount.currency.clone()),
            "merchantReference": content.merchant_reference,
            "reason": status_message(content),
        });

        self.mail
            .send_operator_email(TRANSFER_FUND_FAILED_TEMPLATE, TRANSFER_FUND_FAILED_TITLE, context)
            .await?;
        Ok(())
    }

    async fn process_compensate_negative_balance(
        &self,
        content: &NotificationContent,
        psp_reference: Option<&str>,
    ) -> Result<(), NotificationError> {
        for entry in &content.records {
            let record = entry.record();
            match self.shops.process_compensate_negative_balance(record, psp_reference).await {
                Ok(result) => info!(
                    account_code = %record.account_code,
                    document_id = ?result.manual_accounting_document_id,
                    "Compensated negative balance"
                ),
                Err(e) => error!(account_code = %record.account_code, error = %e, "Failed to compensate negative balance"),
            }
        }
        Ok(())
    }
}

fn status_message(content: &NotificationContent) -> Option<String> {
    match content.status.as_ref()?.message.as_ref()? {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        other => Some(other.to_string()),
    }
}
