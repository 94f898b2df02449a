pub mod email_sender;
pub mod notification_listener;
pub mod scheduler;
