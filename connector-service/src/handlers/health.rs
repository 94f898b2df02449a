use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "connector-service",
            "version": env!("CARGO_PKG_VERSION"),
            "adyenEnvironment": state.config.adyen.environment,
        })),
    )
}
