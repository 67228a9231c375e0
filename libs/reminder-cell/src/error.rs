// libs/reminder-cell/src/error.rs
use thiserror::Error;

use appointment_cell::AppointmentError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error("Settings unavailable: {0}")]
    Settings(#[from] AppError),
}

impl From<ReminderError> for AppError {
    fn from(err: ReminderError) -> Self {
        match err {
            ReminderError::Appointment(inner) => inner.into(),
            ReminderError::Settings(inner) => inner,
        }
    }
}
