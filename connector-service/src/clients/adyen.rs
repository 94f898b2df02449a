//! MarketPay (Adyen for Platforms) Account and Fund API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AdyenConfig;
use crate::models::adyen::{
    AccountHolderResponse, CreateAccountHolderRequest, DeleteBankAccountRequest, ErrorResponse,
    GenericResponse, GetAccountHolderRequest, GetAccountHolderResponse, PayoutAccountHolderRequest,
    PayoutAccountHolderResponse, UpdateAccountHolderRequest, UploadDocumentRequest,
};

const ACCOUNT_API: &str = "/Account/v5";
const FUND_API: &str = "/Fund/v5";

#[derive(Debug, thiserror::Error)]
pub enum AdyenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Adyen API error ({status}, {error_code}): {message}")]
    Api {
        status: u16,
        error_code: String,
        message: String,
        error_type: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdyenError {
    /// JSON error body as MarketPay returned it, for API errors only
    pub fn raw_response(&self) -> Option<String> {
        match self {
            AdyenError::Api {
                status,
                error_code,
                message,
                error_type,
            } => serde_json::to_string(&ErrorResponse {
                status: *status,
                error_code: error_code.clone(),
                message: message.clone(),
                error_type: error_type.clone(),
            })
            .ok(),
            _ => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdyenApi: Send + Sync {
    async fn get_account_holder(&self, account_holder_code: &str)
        -> Result<GetAccountHolderResponse, AdyenError>;

    async fn get_account_holder_by_account_code(
        &self,
        account_code: &str,
    ) -> Result<GetAccountHolderResponse, AdyenError>;

    async fn create_account_holder(
        &self,
        request: CreateAccountHolderRequest,
    ) -> Result<AccountHolderResponse, AdyenError>;

    async fn update_account_holder(
        &self,
        request: UpdateAccountHolderRequest,
    ) -> Result<AccountHolderResponse, AdyenError>;

    async fn delete_bank_accounts(&self, request: DeleteBankAccountRequest)
        -> Result<GenericResponse, AdyenError>;

    async fn upload_document(&self, request: UploadDocumentRequest) -> Result<GenericResponse, AdyenError>;

    async fn payout_account_holder(
        &self,
        request: PayoutAccountHolderRequest,
    ) -> Result<PayoutAccountHolderResponse, AdyenError>;
}

pub struct AdyenClient {
    http_client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl AdyenClient {
    pub fn new(config: &AdyenConfig) -> Result<Self, AdyenError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.app_name.clone())
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, AdyenError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling MarketPay");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body: ErrorResponse = serde_json::from_str(&text).unwrap_or_else(|_| ErrorResponse {
                status: status.as_u16(),
                message: text.clone(),
                ..Default::default()
            });
            return Err(AdyenError::Api {
                status: if body.status == 0 { status.as_u16() } else { body.status },
                error_code: body.error_code,
                message: body.message,
                error_type: body.error_type,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AdyenApi for AdyenClient {
    async fn get_account_holder(
        &self,
        account_holder_code: &str,
    ) -> Result<GetAccountHolderResponse, AdyenError> {
        let request = GetAccountHolderRequest {
            account_holder_code: Some(account_holder_code.to_string()),
            account_code: None,
        };
        self.post(&format!("{}/getAccountHolder", ACCOUNT_API), &request).await
    }

    async fn get_account_holder_by_account_code(
        &self,
        account_code: &str,
    ) -> Result<GetAccountHolderResponse, AdyenError> {
        let request = GetAccountHolderRequest {
            account_holder_code: None,
            account_code: Some(account_code.to_string()),
        };
        self.post(&format!("{}/getAccountHolder", ACCOUNT_API), &request).await
    }

    async fn create_account_holder(
        &self,
        request: CreateAccountHolderRequest,
    ) -> Result<AccountHolderResponse, AdyenError> {
        self.post(&format!("{}/createAccountHolder", ACCOUNT_API), &request).await
    }

    async fn update_account_holder(
        &self,
        request: UpdateAccountHolderRequest,
    ) -> Result<AccountHolderResponse, AdyenError> {
        self.post(&format!("{}/updateAccountHolder", ACCOUNT_API), &request).await
    }

    async fn delete_bank_accounts(
        &self,
        request: DeleteBankAccountRequest,
    ) -> Result<GenericResponse, AdyenError> {
        self.post(&format!("{}/deleteBankAccounts", ACCOUNT_API), &request).await
    }

    async fn upload_document(&self, request: UploadDocumentRequest) -> Result<GenericResponse, AdyenError> {
        self.post(&format!("{}/uploadDocument", ACCOUNT_API), &request).await
    }

    async fn payout_account_holder(
        &self,
        request: PayoutAccountHolderRequest,
    ) -> Result<PayoutAccountHolderResponse, AdyenError> {
        self.post(&format!("{}/payoutAccountHolder", FUND_API), &request).await
    }
}
