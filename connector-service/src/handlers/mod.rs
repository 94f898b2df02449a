pub mod health;
pub mod notification;
pub mod payout;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shared::{ApiResponse, CommonError};
use tracing::error;

use crate::clients::AdyenError;
use crate::services::payout::PayoutError;

/// Handler error rendered as an `ApiResponse` error body
#[derive(Debug)]
pub struct AppError(pub CommonError);

impl<E: Into<CommonError>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body: ApiResponse<()> = ApiResponse::error(self.0.code(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<PayoutError> for CommonError {
    fn from(err: PayoutError) -> Self {
        match err {
            PayoutError::Adyen(AdyenError::Api { status, message, .. }) if status < 500 => {
                CommonError::InvalidInput(message)
            }
            PayoutError::Adyen(e) => CommonError::ExternalService(e.to_string()),
            PayoutError::Database(e) => e.into(),
            PayoutError::Serialization(e) => CommonError::Internal(e.to_string()),
            e @ (PayoutError::BankAccountNotFound { .. } | PayoutError::NoAccount(_)) => {
                CommonError::NotFound(e.to_string())
            }
            e @ PayoutError::InvalidAmount(_) => CommonError::InvalidInput(e.to_string()),
        }
    }
}
