// libs/notification-cell/src/lib.rs
pub mod listener;
pub mod log;
pub mod models;
pub mod webhook;

pub use listener::{recipients_for, spawn_status_change_listener};
pub use log::LogDispatcher;
pub use models::{NotificationKind, NotificationPayload};
pub use webhook::WebhookDispatcher;
