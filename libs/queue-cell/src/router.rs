// libs/queue-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    get_queue_status, set_queue_delay, sync_queue, update_entry_status, upsert_entry,
};
use crate::services::QueueManager;

pub fn queue_routes(config: Arc<AppConfig>, manager: Arc<QueueManager>) -> Router {
    Router::new()
        .route("/entries/{appointment_id}", patch(update_entry_status))
        .route("/{doctor_id}/delay", put(set_queue_delay))
        .route("/{doctor_id}/{date}", get(get_queue_status))
        .route("/{doctor_id}/{date}/entries", post(upsert_entry))
        .route("/{doctor_id}/{date}/sync", post(sync_queue))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(manager)
}
