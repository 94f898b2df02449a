use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use shared::{ApiResponse, CommonError};
use std::sync::Arc;
use tracing::{info, warn};

use super::AppError;
use crate::AppState;

pub const ALERT_HEADER: &str = "X-connector-alert";
pub const PARAMS_HEADER: &str = "X-connector-params";

/// Store the raw webhook body and hand its id to the listener
pub async fn receive_notification(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, [(&'static str, String); 2], Json<ApiResponse<Value>>), AppError> {
    if body.trim().is_empty() {
        return Err(AppError(CommonError::InvalidInput("empty notification".to_string())));
    }

    let id = state.notifications.create(&body).await?;
    info!(id, "Stored MarketPay notification");

    if state.notification_tx.send(id).is_err() {
        warn!(id, "Notification listener is not running, notification will be picked up on restart");
    }

    Ok((
        StatusCode::CREATED,
        [
            (ALERT_HEADER, "connector.adyenNotification.created".to_string()),
            (PARAMS_HEADER, id.to_string()),
        ],
        Json(ApiResponse::success(json!({ "id": id }))),
    ))
}
