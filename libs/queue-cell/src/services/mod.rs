// libs/queue-cell/src/services/mod.rs
pub mod listener;
pub mod manager;
pub mod ordering;

pub use listener::spawn_queue_listener;
pub use manager::QueueManager;
