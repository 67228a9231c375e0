// libs/notification-cell/src/log.rs
use async_trait::async_trait;
use tracing::info;

use appointment_cell::{Appointment, AppointmentStatus, NotificationDispatcher, Recipient};
use shared_models::time;

/// Records notifications in the log only. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

impl LogDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send_reminder(
        &self,
        appointment: &Appointment,
        patient: &Recipient,
        doctor: &Recipient,
    ) -> bool {
        info!(
            "Reminder: appointment {} on {} at {} (patient {}, doctor {})",
            appointment.id,
            appointment.date,
            time::format_hhmm(&appointment.slot.start),
            patient.user_id,
            doctor.user_id
        );
        true
    }

    async fn send_status_change(
        &self,
        appointment: &Appointment,
        recipient: &Recipient,
        new_status: AppointmentStatus,
    ) {
        info!(
            "Status change: appointment {} is now {} (notify {:?} {})",
            appointment.id, new_status, recipient.role, recipient.user_id
        );
    }
}
