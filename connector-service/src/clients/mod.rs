pub mod adyen;
pub mod mirakl;

pub use adyen::{AdyenApi, AdyenClient, AdyenError};
pub use mirakl::{MiraklApi, MiraklClient, MiraklError};
