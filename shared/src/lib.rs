//! Shared utilities and types for the marketplace connector services

// Re-export common dependencies
pub use anyhow;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;

pub mod database;
pub mod observability;
pub mod types;

pub use types::{ApiResponse, CommonError, Result};
