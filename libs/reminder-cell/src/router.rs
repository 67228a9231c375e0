// libs/reminder-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_database::SettingsService;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{check_reminders, get_settings, update_settings};
use crate::scheduler::ReminderScheduler;

pub fn reminder_routes(config: Arc<AppConfig>, scheduler: Arc<ReminderScheduler>) -> Router {
    Router::new()
        .route("/check", post(check_reminders))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(scheduler)
}

pub fn settings_routes(config: Arc<AppConfig>, settings: Arc<SettingsService>) -> Router {
    Router::new()
        .route("/", get(get_settings).put(update_settings))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(settings)
}
