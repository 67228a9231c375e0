// libs/queue-cell/src/lib.rs
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod router;
pub mod services;

pub use error::QueueError;
pub use models::*;
pub use repository::{InMemoryQueueRepository, QueueRepository, SupabaseQueueRepository};
pub use router::queue_routes;
pub use services::{spawn_queue_listener, QueueManager};
