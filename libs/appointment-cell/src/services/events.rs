// libs/appointment-cell/src/services/events.rs
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::AppointmentEvent;

pub type EventReceiver = broadcast::Receiver<AppointmentEvent>;

/// Single publish/subscribe channel for appointment state changes. Every
/// subscriber sees every event published after it subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppointmentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: AppointmentEvent) {
        let appointment_id = event.appointment.id;
        match self.sender.send(event) {
            Ok(receivers) => debug!(
                "Appointment event for {} delivered to {} subscribers",
                appointment_id, receivers
            ),
            Err(_) => debug!("No subscribers for appointment event {}", appointment_id),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
