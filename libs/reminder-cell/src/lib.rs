// libs/reminder-cell/src/lib.rs
pub mod error;
pub mod handlers;
pub mod router;
pub mod scheduler;

pub use error::ReminderError;
pub use router::{reminder_routes, settings_routes};
pub use scheduler::{ReminderReport, ReminderScheduler, SchedulerHandle};
