use serde::{Deserialize, Serialize};

use super::adyen::Amount;

pub const ACCOUNT_HOLDER_VERIFICATION: &str = "ACCOUNT_HOLDER_VERIFICATION";
pub const ACCOUNT_HOLDER_STATUS_CHANGE: &str = "ACCOUNT_HOLDER_STATUS_CHANGE";
pub const ACCOUNT_HOLDER_CREATED: &str = "ACCOUNT_HOLDER_CREATED";
pub const ACCOUNT_HOLDER_UPDATED: &str = "ACCOUNT_HOLDER_UPDATED";
pub const ACCOUNT_HOLDER_PAYOUT: &str = "ACCOUNT_HOLDER_PAYOUT";
pub const TRANSFER_FUNDS: &str = "TRANSFER_FUNDS";
pub const COMPENSATE_NEGATIVE_BALANCE: &str = "COMPENSATE_NEGATIVE_BALANCE";

/// Webhook notification pushed by MarketPay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event_type: String,
    #[serde(default)]
    pub psp_reference: Option<String>,
    #[serde(default)]
    pub content: NotificationContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationContent {
    pub account_holder_code: Option<String>,
    pub account_code: Option<String>,
    pub verification_status: Option<String>,
    pub verification_type: Option<String>,
    pub shareholder_code: Option<String>,
    #[serde(rename = "bankAccountUUID")]
    pub bank_account_uuid: Option<String>,
    pub old_status: Option<AccountHolderStatus>,
    pub new_status: Option<AccountHolderStatus>,
    pub invalid_fields: Vec<InvalidField>,
    pub status: Option<OperationStatus>,
    pub source_account_code: Option<String>,
    pub destination_account_code: Option<String>,
    pub amount: Option<Amount>,
    pub merchant_reference: Option<String>,
    pub records: Vec<CompensateNegativeBalanceEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountHolderStatus {
    pub status: Option<String>,
    pub payout_state: Option<PayoutState>,
}

impl AccountHolderStatus {
    pub fn allow_payout(&self) -> bool {
        self.payout_state
            .as_ref()
            .and_then(|state| state.allow_payout)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayoutState {
    pub allow_payout: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvalidField {
    pub error_code: Option<i64>,
    pub error_description: Option<String>,
    pub field_type: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationStatus {
    pub status_code: Option<String>,
    pub message: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateNegativeBalanceRecord {
    pub account_code: String,
    pub amount: Amount,
    #[serde(default)]
    pub transfer_date: Option<String>,
}

/// Records arrive wrapped in a container object or bare
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompensateNegativeBalanceEntry {
    Wrapped {
        #[serde(rename = "CompensateNegativeBalanceNotificationRecord")]
        record: CompensateNegativeBalanceRecord,
    },
    Plain(CompensateNegativeBalanceRecord),
}

impl CompensateNegativeBalanceEntry {
    pub fn record(&self) -> &CompensateNegativeBalanceRecord {
        match self {
            CompensateNegativeBalanceEntry::Wrapped { record } => record,
            CompensateNegativeBalanceEntry::Plain(record) => record,
        }
    }
}

impl NotificationContent {
    pub fn status_code(&self) -> Option<&str> {
        self.status.as_ref().and_then(|status| status.status_code.as_deref())
    }
}
