// libs/appointment-cell/src/error.rs
use thiserror::Error;
use uuid::Uuid;

use availability_cell::SlotError;
use shared_models::error::AppError;

use crate::models::AppointmentStatus;

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Illegal transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment changed concurrently: expected {expected}, found {current}")]
    StaleWrite {
        expected: AppointmentStatus,
        current: AppointmentStatus,
    },

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl AppointmentError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AppointmentError::InvalidTransition { .. }
                | AppointmentError::StaleWrite { .. }
                | AppointmentError::Slot(SlotError::AlreadyBooked { .. })
                | AppointmentError::Slot(SlotError::Conflict(_))
        )
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::InvalidTransition { .. } | AppointmentError::StaleWrite { .. } => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::Slot(slot) => slot.into(),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Persistence(msg) => AppError::Persistence(msg),
        }
    }
}
