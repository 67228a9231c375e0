// libs/appointment-cell/src/services/notifier.rs
use async_trait::async_trait;

use crate::models::{Appointment, AppointmentStatus, Recipient};

/// Outbound notification collaborator.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Returns `true` only when the reminder was accepted for delivery.
    async fn send_reminder(
        &self,
        appointment: &Appointment,
        patient: &Recipient,
        doctor: &Recipient,
    ) -> bool;

    /// Fire-and-forget; failures are logged by the implementation.
    async fn send_status_change(
        &self,
        appointment: &Appointment,
        recipient: &Recipient,
        new_status: AppointmentStatus,
    );
}
