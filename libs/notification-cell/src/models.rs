// libs/notification-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentStatus, ConsultationMode, Recipient};
use shared_models::time;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    StatusChange,
}

/// JSON body delivered to the webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub recipients: Vec<Recipient>,
    pub date: NaiveDate,
    /// Clinic-local `HH:MM`.
    pub start_time: String,
    pub status: AppointmentStatus,
    pub consultation_mode: ConsultationMode,
    pub sent_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn reminder(appointment: &Appointment, patient: &Recipient, doctor: &Recipient) -> Self {
        Self::build(
            NotificationKind::Reminder,
            appointment,
            vec![*patient, *doctor],
            appointment.status,
        )
    }

    pub fn status_change(
        appointment: &Appointment,
        recipient: &Recipient,
        new_status: AppointmentStatus,
    ) -> Self {
        Self::build(
            NotificationKind::StatusChange,
            appointment,
            vec![*recipient],
            new_status,
        )
    }

    fn build(
        kind: NotificationKind,
        appointment: &Appointment,
        recipients: Vec<Recipient>,
        status: AppointmentStatus,
    ) -> Self {
        Self {
            kind,
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            recipients,
            date: appointment.date,
            start_time: time::format_hhmm(&appointment.slot.start),
            status,
            consultation_mode: appointment.consultation_mode,
            sent_at: Utc::now(),
        }
    }
}
