use axum::{routing::get, Router};

use appointment_cell::appointment_routes;
use availability_cell::availability_routes;
use queue_cell::queue_routes;
use reminder_cell::{reminder_routes, settings_routes};

use crate::state::Services;

pub fn create_router(services: &Services) -> Router {
    let config = services.config.clone();

    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .nest(
            "/appointments",
            appointment_routes(config.clone(), services.appointments.clone()),
        )
        .nest(
            "/availability",
            availability_routes(config.clone(), services.slots.clone()),
        )
        .nest("/queue", queue_routes(config.clone(), services.queue.clone()))
        .nest(
            "/reminders",
            reminder_routes(config.clone(), services.reminders.clone()),
        )
        .nest("/settings", settings_routes(config, services.settings.clone()))
}
