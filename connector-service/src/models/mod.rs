// connector-service/src/models/mod.rs

pub mod adyen;
pub mod adyen_notification;
pub mod delta;
pub mod doc_retry;
pub mod mirakl;
pub mod notification;
pub mod payout_error;
pub mod process_email;
pub mod shareholder_mapping;

pub use adyen_notification::*;
pub use delta::*;
pub use doc_retry::*;
pub use payout_error::*;
pub use process_email::*;
pub use shareholder_mapping::*;
