// libs/appointment-cell/src/services/mod.rs
pub mod events;
pub mod lifecycle;
pub mod notifier;

pub use events::{EventBus, EventReceiver};
pub use lifecycle::AppointmentLifecycle;
pub use notifier::NotificationDispatcher;
