// libs/queue-cell/src/services/listener.rs
use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use appointment_cell::EventReceiver;

use crate::services::manager::QueueManager;

/// Applies every appointment event to the matching queue day until shutdown
/// is signalled or the bus closes.
pub fn spawn_queue_listener(
    manager: Arc<QueueManager>,
    mut events: EventReceiver,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Queue listener started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Queue listener received shutdown signal");
                    break;
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = manager.reconcile_event(&event).await {
                            error!(
                                "Failed to reconcile queue for appointment {}: {}",
                                event.appointment.id, e
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Queue listener lagged, {} events skipped; next sync will converge", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        info!("Queue listener stopped");
    })
}
