//! Common error type for the connector services

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommonError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            CommonError::InvalidInput(_) => 400,
            CommonError::NotFound(_) => 404,
            CommonError::ExternalService(_) => 502,
            CommonError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Short machine readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            CommonError::Database(_) => "database_error",
            CommonError::NotFound(_) => "not_found",
            CommonError::InvalidInput(_) => "invalid_input",
            CommonError::ExternalService(_) => "external_service_error",
            CommonError::Configuration(_) => "configuration_error",
            CommonError::Timeout(_) => "timeout",
            CommonError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommonError::Timeout(_) | CommonError::ExternalService(_) | CommonError::Database(_)
        )
    }
}

impl From<sqlx::Error> for CommonError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CommonError::NotFound("row not found".to_string()),
            other => CommonError::Database(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        CommonError::Internal(err.to_string())
    }
}
