// libs/availability-cell/src/lib.rs
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod router;
pub mod services;
pub mod supabase;

pub use error::SlotError;
pub use models::*;
pub use repository::{AvailabilityRepository, InMemoryAvailabilityRepository};
pub use router::availability_routes;
pub use services::SlotStore;
pub use supabase::SupabaseAvailabilityRepository;
