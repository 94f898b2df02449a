//! Shared type definitions for the connector services
//!
//! - API response envelope returned by every HTTP handler
//! - Common error type used at service boundaries

pub mod common;
pub mod error;

pub use common::{ApiError, ApiResponse};
pub use error::CommonError;

pub type Result<T> = std::result::Result<T, CommonError>;
