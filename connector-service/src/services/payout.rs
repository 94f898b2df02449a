use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::clients::{AdyenApi, AdyenError};
use crate::models::adyen::{Amount, PayoutAccountHolderRequest, PayoutAccountHolderResponse};
use crate::repository::PayoutErrorRepository;

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Adyen error: {0}")]
    Adyen(#[from] AdyenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No bank account found for account holder {account_holder_code} with iban {iban}")]
    BankAccountNotFound { account_holder_code: String, iban: String },

    #[error("Account holder {0} has no account")]
    NoAccount(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Convert a decimal amount such as `10.25` into minor units
pub fn to_minor_units(amount: &str) -> Result<i64, PayoutError> {
    let value = Decimal::from_str(amount.trim()).map_err(|_| PayoutError::InvalidAmount(amount.to_string()))?;
    if value.is_sign_negative() || value.normalize().scale() > 2 {
        return Err(PayoutError::InvalidAmount(amount.to_string()));
    }

    (value * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| PayoutError::InvalidAmount(amount.to_string()))
}

#[derive(Clone)]
pub struct PayoutService {
    adyen: Arc<dyn AdyenApi>,
    errors: Arc<dyn PayoutErrorRepository>,
}

impl PayoutService {
    pub fn new(adyen: Arc<dyn AdyenApi>, errors: Arc<dyn PayoutErrorRepository>) -> Self {
        Self { adyen, errors }
    }

    pub async fn create_payout_account_holder_request(
        &self,
        account_holder_code: &str,
        amount: &str,
        currency: &str,
        iban: &str,
        description: Option<&str>,
    ) -> Result<PayoutAccountHolderRequest, PayoutError> {
        let value = to_minor_units(amount)?;
        let holder = self.adyen.get_account_holder(account_holder_code).await?;

        let bank_account_uuid = holder
            .account_holder_details
            .bank_account_details
            .iter()
            .find(|detail| detail.iban.as_deref().map(str::trim) == Some(iban.trim()))
            .and_then(|detail| detail.bank_account_uuid.clone())
            .ok_or_else(|| PayoutError::BankAccountNotFound {
                account_holder_code: account_holder_code.to_string(),
                iban: iban.to_string(),
            })?;

        let account_code = holder
            .accounts
            .first()
            .map(|account| account.account_code.clone())
            .ok_or_else(|| PayoutError::NoAccount(account_holder_code.to_string()))?;

        Ok(PayoutAccountHolderRequest {
            account_code,
            account_holder_code: account_holder_code.to_string(),
            amount: Amount {
                currency: currency.to_string(),
                value,
            },
            bank_account_uuid,
            description: description.map(str::to_string),
        })
    }

    /// Failed payouts are stored for the retry job before the error is returned
    pub async fn payout(
        &self,
        request: PayoutAccountHolderRequest,
    ) -> Result<PayoutAccountHolderResponse, PayoutError> {
        match self.adyen.payout_account_holder(request.clone()).await {
            Ok(response) => {
                info!(
                    account_holder_code = %request.account_holder_code,
                    psp_reference = ?response.psp_reference,
                    "Payout submitted"
                );
                Ok(response)
            }
            Err(e) => {
                error!(account_holder_code = %request.account_holder_code, error = %e, "Payout failed");
                self.store_payout_error(&request, e.raw_response()).await?;
                Err(e.into())
            }
        }
    }

    async fn store_payout_error(
        &self,
        request: &PayoutAccountHolderRequest,
        raw_response: Option<String>,
    ) -> Result<(), PayoutError> {
        let raw_request = serde_json::to_string(request)?;
        let stored = self
            .errors
            .create(&request.account_holder_code, &raw_request, raw_response)
            .await?;
        info!(id = stored.id, account_holder_code = %stored.account_holder_code, "Stored failed payout");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::adyen::MockAdyenApi;
    use crate::models::adyen::{
        Account, AccountHolderDetails, BankAccountDetail, GetAccountHolderResponse,
    };
    use crate::models::AdyenPayoutError;
    use crate::repository::MockPayoutErrorRepository;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn holder() -> GetAccountHolderResponse {
        GetAccountHolderResponse {
            account_holder_code: Some("2012".to_string()),
            account_holder_details: AccountHolderDetails {
                bank_account_details: vec![
                    BankAccountDetail {
                        bank_account_uuid: Some("uuid-1".to_string()),
                        iban: Some("GB00IBAN1".to_string()),
                        ..Default::default()
                    },
                    BankAccountDetail {
                        bank_account_uuid: Some("uuid-2".to_string()),
                        iban: Some("GB00IBAN2".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            accounts: vec![
                Account {
                    account_code: "8815".to_string(),
                    description: None,
                },
                Account {
                    account_code: "9999".to_string(),
                    description: None,
                },
            ],
            ..Default::default()
        }
    }

    fn request() -> PayoutAccountHolderRequest {
        PayoutAccountHolderRequest {
            account_code: "8815".to_string(),
            account_holder_code: "2012".to_string(),
            amount: Amount {
                currency: "EUR".to_string(),
                value: 1025,
            },
            bank_account_uuid: "uuid-2".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units("10.25").unwrap(), 1025);
        assert_eq!(to_minor_units("7").unwrap(), 700);
        assert_eq!(to_minor_units("0.5").unwrap(), 50);
        assert!(to_minor_units("10.255").is_err());
        assert!(to_minor_units("-1").is_err());
        assert!(to_minor_units("ten").is_err());
    }

    #[tokio::test]
    async fn test_request_uses_bank_account_matching_iban() {
        let mut adyen = MockAdyenApi::new();
        adyen.expect_get_account_holder().returning(|_| Ok(holder()));

        let service = PayoutService::new(Arc::new(adyen), Arc::new(MockPayoutErrorRepository::new()));
        let built = service
            .create_payout_account_holder_request("2012", "10.25", "EUR", "GB00IBAN2", None)
            .await
            .unwrap();

        assert_eq!(built, request());
    }

    #[tokio::test]
    async fn test_unknown_iban_is_rejected() {
        let mut adyen = MockAdyenApi::new();
        adyen.expect_get_account_holder().returning(|_| Ok(holder()));

        let service = PayoutService::new(Arc::new(adyen), Arc::new(MockPayoutErrorRepository::new()));
        let err = service
            .create_payout_account_holder_request("2012", "10.25", "EUR", "FR00OTHER", None)
            .await
            .unwrap_err();

        assert!(matches!(err, PayoutError::BankAccountNotFound { .. }));
    }

    #[tokio::test]
    async fn test_failed_payout_is_stored() {
        let mut adyen = MockAdyenApi::new();
        adyen.expect_payout_account_holder().returning(|_| {
            Err(AdyenError::Api {
                status: 403,
                error_code: "10_069".to_string(),
                message: "Payout not allowed".to_string(),
                error_type: "security".to_string(),
            })
        });

        let mut errors = MockPayoutErrorRepository::new();
        errors
            .expect_create()
            .withf(|code, raw_request, raw_response| {
                let stored: PayoutAccountHolderRequest = serde_json::from_str(raw_request).unwrap();
                code == "2012"
                    && stored == request()
                    && raw_response.as_deref().map_or(false, |raw| raw.contains("10_069"))
            })
            .times(1)
            .returning(|code, raw_request, raw_response| {
                Ok(AdyenPayoutError {
                    id: 1,
                    account_holder_code: code.to_string(),
                    raw_request: raw_request.to_string(),
                    raw_response,
                    retry: 0,
                    processing: false,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
            });

        let service = PayoutService::new(Arc::new(adyen), Arc::new(errors));
        let err = service.payout(request()).await.unwrap_err();
        assert!(matches!(err, PayoutError::Adyen(AdyenError::Api { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_successful_payout_stores_nothing() {
        let mut adyen = MockAdyenApi::new();
        adyen.expect_payout_account_holder().returning(|_| {
            Ok(PayoutAccountHolderResponse {
                psp_reference: Some("psp-1".to_string()),
                ..Default::default()
            })
        });
        let mut errors = MockPayoutErrorRepository::new();
        errors.expect_create().never();

        let service = PayoutService::new(Arc::new(adyen), Arc::new(errors));
        let response = service.payout(request()).await.unwrap();
        assert_eq!(response.psp_reference.as_deref(), Some("psp-1"));
    }
}
