// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::extractor::CurrentActor;

use crate::models::{ConfigureDayRequest, ScheduleRequest};
use crate::services::SlotStore;

/// Get (generating on first access) a doctor's day
pub async fn get_day(
    State(store): State<Arc<SlotStore>>,
    CurrentActor(_actor): CurrentActor,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let day = store.get_or_generate(doctor_id, date).await?;
    Ok(Json(json!(day)))
}

/// Free, non-break slots of a day
pub async fn get_available_slots(
    State(store): State<Arc<SlotStore>>,
    CurrentActor(_actor): CurrentActor,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let slots = store.available_slots(doctor_id, date).await?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": date,
        "total": slots.len(),
        "slots": slots,
    })))
}

pub async fn get_schedule(
    State(store): State<Arc<SlotStore>>,
    CurrentActor(_actor): CurrentActor,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = store.schedule_for(doctor_id).await?;
    Ok(Json(json!(schedule)))
}

pub async fn put_schedule(
    State(store): State<Arc<SlotStore>>,
    CurrentActor(actor): CurrentActor,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_doctor_access(doctor_id)?;
    info!("Schedule update for doctor {} by {}", doctor_id, actor.user_id);

    let schedule = store.configure_schedule(doctor_id, request).await?;
    Ok(Json(json!(schedule)))
}

pub async fn put_day(
    State(store): State<Arc<SlotStore>>,
    CurrentActor(actor): CurrentActor,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Json(request): Json<ConfigureDayRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_doctor_access(doctor_id)?;
    info!("Day {} update for doctor {} by {}", date, doctor_id, actor.user_id);

    let day = store.configure_day(doctor_id, date, request).await?;
    Ok(Json(json!(day)))
}
