// libs/reminder-cell/src/handlers.rs
use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tracing::info;

use shared_database::{SettingsService, UpdateSettingsRequest};
use shared_models::auth::Actor;
use shared_models::error::AppError;
use shared_utils::extractor::CurrentActor;

use crate::scheduler::ReminderScheduler;

fn require_admin(actor: &Actor, action: &str) -> Result<(), AppError> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Only administrators can {}",
            action
        )))
    }
}

/// Run a reminder scan now (admin)
pub async fn check_reminders(
    State(scheduler): State<Arc<ReminderScheduler>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Value>, AppError> {
    require_admin(&actor, "trigger reminder checks")?;

    info!("Manual reminder check by {}", actor.user_id);
    let report = scheduler.check_reminders().await?;
    Ok(Json(json!(report)))
}

pub async fn get_settings(
    State(settings): State<Arc<SettingsService>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Value>, AppError> {
    require_admin(&actor, "view clinic settings")?;
    let current = settings.get().await?;
    Ok(Json(json!(current)))
}

pub async fn update_settings(
    State(settings): State<Arc<SettingsService>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&actor, "change clinic settings")?;

    info!("Clinic settings change by {}", actor.user_id);
    let updated = settings.update(request).await?;
    Ok(Json(json!(updated)))
}
