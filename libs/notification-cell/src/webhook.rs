// libs/notification-cell/src/webhook.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, warn};

use appointment_cell::{Appointment, AppointmentStatus, NotificationDispatcher, Recipient};

use crate::models::NotificationPayload;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers notifications as JSON `POST`s to a single endpoint.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            client,
            url: url.into(),
        }
    }

    async fn post(&self, payload: &NotificationPayload) -> bool {
        debug!(
            "Posting {:?} notification for appointment {} to {}",
            payload.kind, payload.appointment_id, self.url
        );

        let response = match self.client.post(&self.url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    "Notification webhook unreachable for appointment {}: {}",
                    payload.appointment_id, e
                );
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                "Notification webhook rejected appointment {}: {} - {}",
                payload.appointment_id, status, body
            );
            return false;
        }

        true
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send_reminder(
        &self,
        appointment: &Appointment,
        patient: &Recipient,
        doctor: &Recipient,
    ) -> bool {
        self.post(&NotificationPayload::reminder(appointment, patient, doctor))
            .await
    }

    async fn send_status_change(
        &self,
        appointment: &Appointment,
        recipient: &Recipient,
        new_status: AppointmentStatus,
    ) {
        let payload = NotificationPayload::status_change(appointment, recipient, new_status);
        if !self.post(&payload).await {
            warn!(
                "Status change notification for appointment {} was dropped",
                appointment.id
            );
        }
    }
}
