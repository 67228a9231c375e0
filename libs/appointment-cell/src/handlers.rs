// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::extractor::CurrentActor;

use crate::models::{BookAppointmentRequest, RescheduleRequest, TransitionRequest};
use crate::services::AppointmentLifecycle;

/// Book a new appointment (status `pending`)
pub async fn book_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycle>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    info!("Booking request from {} {}", actor.role, actor.user_id);

    let appointment = lifecycle.book(request, &actor).await?;
    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

pub async fn get_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycle>>,
    CurrentActor(actor): CurrentActor,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = lifecycle.get(appointment_id, &actor).await?;
    Ok(Json(json!(appointment)))
}

/// Move an appointment through the state machine
pub async fn transition_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycle>>,
    CurrentActor(actor): CurrentActor,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = lifecycle
        .transition(appointment_id, request.status, &actor, request.notes)
        .await?;
    Ok(Json(json!(appointment)))
}

pub async fn reschedule_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycle>>,
    CurrentActor(actor): CurrentActor,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = lifecycle.reschedule(appointment_id, request, &actor).await?;
    Ok(Json(json!(appointment)))
}
