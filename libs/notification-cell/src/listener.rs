// libs/notification-cell/src/listener.rs
use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use appointment_cell::{AppointmentEvent, EventReceiver, NotificationDispatcher, Recipient};
use shared_database::SettingsService;
use shared_models::auth::ActorRole;

/// Counter-party of whoever caused the event. Privileged actors notify both sides.
pub fn recipients_for(event: &AppointmentEvent) -> Vec<Recipient> {
    let appointment = &event.appointment;
    match event.actor.role {
        ActorRole::Patient => vec![appointment.doctor()],
        ActorRole::Doctor => vec![appointment.patient()],
        ActorRole::Admin | ActorRole::System => {
            vec![appointment.patient(), appointment.doctor()]
        }
    }
}

/// Forwards appointment events to the dispatcher until shutdown is signalled
/// or the bus closes.
pub fn spawn_status_change_listener(
    dispatcher: Arc<dyn NotificationDispatcher>,
    settings: Arc<SettingsService>,
    mut events: EventReceiver,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Status change listener started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Status change listener received shutdown signal");
                    break;
                }
                received = events.recv() => match received {
                    Ok(event) => notify(dispatcher.as_ref(), &settings, &event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Status change listener lagged, {} notifications lost", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        info!("Status change listener stopped");
    })
}

async fn notify(
    dispatcher: &dyn NotificationDispatcher,
    settings: &SettingsService,
    event: &AppointmentEvent,
) {
    match settings.get().await {
        Ok(current) if !current.status_change_notifications => {
            debug!(
                "Status change notifications disabled, skipping appointment {}",
                event.appointment.id
            );
            return;
        }
        Ok(_) => {}
        Err(e) => {
            error!("Could not load clinic settings, skipping notification: {}", e);
            return;
        }
    }

    for recipient in recipients_for(event) {
        dispatcher
            .send_status_change(&event.appointment, &recipient, event.new_status)
            .await;
    }
}
