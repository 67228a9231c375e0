use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use appointment_cell::{
    AppointmentLifecycle, AppointmentRepository, EventBus, InMemoryAppointmentRepository,
    NotificationDispatcher, SupabaseAppointmentRepository,
};
use availability_cell::{
    AvailabilityRepository, InMemoryAvailabilityRepository, SlotStore,
    SupabaseAvailabilityRepository,
};
use notification_cell::{spawn_status_change_listener, LogDispatcher, WebhookDispatcher};
use queue_cell::{
    spawn_queue_listener, InMemoryQueueRepository, QueueManager, QueueRepository,
    SupabaseQueueRepository,
};
use reminder_cell::{ReminderScheduler, SchedulerHandle};
use shared_config::AppConfig;
use shared_database::{
    ClinicSettings, InMemorySettingsRepository, SettingsRepository, SettingsService,
    SupabaseClient, SupabaseSettingsRepository,
};

/// Every long-lived service the API routes and background tasks share.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<AppConfig>,
    pub slots: Arc<SlotStore>,
    pub appointments: Arc<AppointmentLifecycle>,
    pub queue: Arc<QueueManager>,
    pub settings: Arc<SettingsService>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub reminders: Arc<ReminderScheduler>,
}

struct Repositories {
    availability: Arc<dyn AvailabilityRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    queue: Arc<dyn QueueRepository>,
    settings: Arc<dyn SettingsRepository>,
}

impl Services {
    /// Supabase-backed when persistence is configured, in-memory otherwise.
    pub fn from_config(config: AppConfig) -> Self {
        let repositories = if config.is_persistence_configured() {
            info!("Using Supabase persistence at {}", config.supabase_url);
            let supabase = Arc::new(SupabaseClient::new(&config));
            Repositories {
                availability: Arc::new(SupabaseAvailabilityRepository::new(supabase.clone())),
                appointments: Arc::new(SupabaseAppointmentRepository::new(supabase.clone())),
                queue: Arc::new(SupabaseQueueRepository::new(supabase.clone())),
                settings: Arc::new(SupabaseSettingsRepository::new(supabase)),
            }
        } else {
            info!("Supabase not configured, using in-memory stores");
            Repositories::in_memory()
        };

        Self::assemble(config, repositories)
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::assemble(config, Repositories::in_memory())
    }

    fn assemble(config: AppConfig, repositories: Repositories) -> Self {
        let dispatcher: Arc<dyn NotificationDispatcher> = match &config.notification_webhook_url {
            Some(url) => {
                info!("Notifications delivered to webhook {}", url);
                Arc::new(WebhookDispatcher::new(url.clone()))
            }
            None => Arc::new(LogDispatcher::new()),
        };

        let slots = Arc::new(SlotStore::new(
            repositories.availability,
            config.default_slot_duration_minutes,
        ));
        let appointments = Arc::new(AppointmentLifecycle::new(
            repositories.appointments,
            slots.clone(),
            EventBus::default(),
            &config,
        ));
        let queue = Arc::new(QueueManager::new(
            repositories.queue,
            appointments.clone(),
            &config,
        ));
        let settings = Arc::new(SettingsService::new(
            repositories.settings,
            ClinicSettings::from_config(&config),
        ));
        let reminders = Arc::new(ReminderScheduler::new(
            appointments.clone(),
            dispatcher.clone(),
            settings.clone(),
            &config,
        ));

        Self {
            config: Arc::new(config),
            slots,
            appointments,
            queue,
            settings,
            dispatcher,
            reminders,
        }
    }

    /// Spawns the event listeners and the reminder scheduler.
    pub fn start_background(&self) -> BackgroundTasks {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = self.appointments.events();

        let listeners = vec![
            spawn_queue_listener(self.queue.clone(), events.subscribe(), shutdown_rx.clone()),
            spawn_status_change_listener(
                self.dispatcher.clone(),
                self.settings.clone(),
                events.subscribe(),
                shutdown_rx,
            ),
        ];

        BackgroundTasks {
            shutdown_tx,
            listeners,
            scheduler: self.reminders.clone().start(),
        }
    }
}

impl Repositories {
    fn in_memory() -> Self {
        Self {
            availability: Arc::new(InMemoryAvailabilityRepository::new()),
            appointments: Arc::new(InMemoryAppointmentRepository::new()),
            queue: Arc::new(InMemoryQueueRepository::new()),
            settings: Arc::new(InMemorySettingsRepository::new()),
        }
    }
}

pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    listeners: Vec<JoinHandle<()>>,
    scheduler: SchedulerHandle,
}

impl BackgroundTasks {
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        let _ = self.shutdown_tx.send(true);
        for listener in self.listeners {
            if let Err(e) = listener.await {
                error!("Background listener ended abnormally: {}", e);
            }
        }
        info!("Background tasks stopped");
    }
}
