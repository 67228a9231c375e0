// libs/queue-cell/src/handlers.rs
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

use crate::models::{QueueStatus, SetDelayRequest, UpdateEntryStatusRequest, UpsertEntryRequest};
use crate::services::QueueManager;

/// Get the live queue for a doctor's day
pub async fn get_queue_status(
    State(manager): State<Arc<QueueManager>>,
    CurrentActor(_actor): CurrentActor,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let status = manager.get_status(doctor_id, date).await?;
    Ok(Json(json!(status)))
}

pub async fn upsert_entry(
    State(manager): State<Arc<QueueManager>>,
    CurrentActor(actor): CurrentActor,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Json(request): Json<UpsertEntryRequest>,
) -> Result<Json<Value>, AppError> {
    let day = manager.upsert_entry(doctor_id, date, request, &actor).await?;
    Ok(Json(json!(QueueStatus::from(day))))
}

pub async fn sync_queue(
    State(manager): State<Arc<QueueManager>>,
    CurrentActor(actor): CurrentActor,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    info!("Queue sync for doctor {} on {} by {}", doctor_id, date, actor.user_id);
    let day = manager.sync_with_appointments(doctor_id, date, &actor).await?;
    Ok(Json(json!(QueueStatus::from(day))))
}

pub async fn set_queue_delay(
    State(manager): State<Arc<QueueManager>>,
    CurrentActor(actor): CurrentActor,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<SetDelayRequest>,
) -> Result<Json<Value>, AppError> {
    let day = manager.set_delay(doctor_id, request.minutes, &actor).await?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": day.date_key,
        "current_delay": day.current_delay,
    })))
}

pub async fn update_entry_status(
    State(manager): State<Arc<QueueManager>>,
    CurrentActor(actor): CurrentActor,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateEntryStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let day = manager
        .update_entry_status(appointment_id, request, &actor)
        .await?;
    Ok(Json(json!(QueueStatus::from(day))))
}
