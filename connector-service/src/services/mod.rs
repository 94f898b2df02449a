pub mod address;
pub mod delta;
pub mod document;
pub mod mail;
pub mod notification;
pub mod payout;
pub mod retry_payout;
pub mod shareholder_mapping;
pub mod shop;
pub mod ubo;
