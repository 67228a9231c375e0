// libs/queue-cell/src/error.rs
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use shared_models::error::AppError;

use crate::models::QueueEntryStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("No queue entry for appointment {0}")]
    EntryNotFound(Uuid),

    #[error("Invalid queue status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: QueueEntryStatus,
        to: QueueEntryStatus,
    },

    #[error("Appointment {0} is already in progress")]
    AnotherInProgress(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::EntryNotFound(_) => AppError::NotFound(err.to_string()),
            QueueError::InvalidStatusTransition { .. } | QueueError::AnotherInProgress(_) => {
                AppError::Conflict(err.to_string())
            }
            QueueError::ValidationError(msg) => AppError::ValidationError(msg),
            QueueError::Forbidden(msg) => AppError::Forbidden(msg),
            QueueError::Persistence(msg) => AppError::Persistence(msg),
            QueueError::Appointment(inner) => inner.into(),
        }
    }
}

impl From<AppError> for QueueError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Forbidden(msg) => QueueError::Forbidden(msg),
            other => QueueError::ValidationError(other.to_string()),
        }
    }
}
