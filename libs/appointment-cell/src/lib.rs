// libs/appointment-cell/src/lib.rs
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod router;
pub mod services;
pub mod supabase;

pub use error::AppointmentError;
pub use models::*;
pub use repository::{AppointmentRepository, InMemoryAppointmentRepository};
pub use router::appointment_routes;
pub use services::{AppointmentLifecycle, EventBus, EventReceiver, NotificationDispatcher};
pub use supabase::SupabaseAppointmentRepository;
