// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::get,
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{get_available_slots, get_day, get_schedule, put_day, put_schedule};
use crate::services::SlotStore;

pub fn availability_routes(config: Arc<AppConfig>, store: Arc<SlotStore>) -> Router {
    Router::new()
        .route("/{doctor_id}/schedule", get(get_schedule).put(put_schedule))
        .route("/{doctor_id}/days/{date}", get(get_day).put(put_day))
        .route("/{doctor_id}/days/{date}/available", get(get_available_slots))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(store)
}
