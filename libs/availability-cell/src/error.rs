// libs/availability-cell/src/error.rs
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("No availability for doctor {doctor_id} on {date}")]
    DayNotFound { doctor_id: Uuid, date: String },

    #[error("Slot {start} does not exist on {date}")]
    SlotNotFound { date: String, start: String },

    #[error("Slot {start} on {date} is already booked")]
    AlreadyBooked {
        date: String,
        start: String,
        appointment_id: Option<Uuid>,
    },

    #[error("Slot {start} on {date} is a break")]
    BreakSlot { date: String, start: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::DayNotFound { .. } | SlotError::SlotNotFound { .. } => {
                AppError::NotFound(err.to_string())
            }
            SlotError::AlreadyBooked { .. } | SlotError::Conflict(_) => {
                AppError::Conflict(err.to_string())
            }
            SlotError::BreakSlot { .. } | SlotError::ValidationError(_) => {
                AppError::ValidationError(err.to_string())
            }
            SlotError::Persistence(msg) => AppError::Persistence(msg),
        }
    }
}
