// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    book_appointment, get_appointment, reschedule_appointment, transition_appointment,
};
use crate::services::AppointmentLifecycle;

pub fn appointment_routes(config: Arc<AppConfig>, lifecycle: Arc<AppointmentLifecycle>) -> Router {
    Router::new()
        .route("/", post(book_appointment))
        .route("/{appointment_id}", get(get_appointment))
        .route("/{appointment_id}/transition", post(transition_appointment))
        .route("/{appointment_id}/reschedule", post(reschedule_appointment))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(lifecycle)
}
