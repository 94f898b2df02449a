use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use shared::{ApiResponse, CommonError};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::AppError;
use crate::models::adyen::PayoutAccountHolderResponse;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    #[validate(length(min = 1, max = 50))]
    pub account_holder_code: String,

    /// Decimal amount in major units, e.g. `10.25`
    #[validate(length(min = 1))]
    pub amount: String,

    #[validate(length(equal = 3))]
    pub currency: String,

    #[validate(length(min = 5, max = 34))]
    pub iban: String,

    pub description: Option<String>,
}

pub async fn create_payout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PayoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PayoutAccountHolderResponse>>), AppError> {
    payload
        .validate()
        .map_err(|e| CommonError::InvalidInput(format!("{}", e)))?;

    info!(account_holder_code = %payload.account_holder_code, amount = %payload.amount, "Payout requested");

    let request = state
        .payouts
        .create_payout_account_holder_request(
            &payload.account_holder_code,
            &payload.amount,
            &payload.currency,
            &payload.iban,
            payload.description.as_deref(),
        )
        .await?;
    let response = state.payouts.payout(request).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))))
}
