// libs/reminder-cell/src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use appointment_cell::{Appointment, AppointmentLifecycle, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::SettingsService;
use shared_models::time;

use crate::error::ReminderError;

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderReport {
    pub enabled: bool,
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
    /// Unreminded appointments past the window but not yet started.
    pub missed: usize,
}

/// Polls for confirmed appointments entering the reminder window. At most one
/// scan runs at a time; `reminder_sent` guards against duplicates across scans.
pub struct ReminderScheduler {
    appointments: Arc<AppointmentLifecycle>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    settings: Arc<SettingsService>,
    clinic_offset: FixedOffset,
    interval: Duration,
    scan_lock: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(
        appointments: Arc<AppointmentLifecycle>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        settings: Arc<SettingsService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            appointments,
            dispatcher,
            settings,
            clinic_offset: time::clinic_offset(config.clinic_utc_offset_minutes),
            interval: Duration::from_secs(config.reminder_interval_seconds.max(1)),
            scan_lock: Mutex::new(()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Manual trigger: waits for a running scan, then scans.
    pub async fn check_reminders(&self) -> Result<ReminderReport, ReminderError> {
        self.check_reminders_at(Utc::now()).await
    }

    pub async fn check_reminders_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReminderReport, ReminderError> {
        let _guard = self.scan_lock.lock().await;
        self.scan(now).await
    }

    /// Interval trigger: `None` when a scan is already running.
    pub async fn try_tick_at(
        &self,
        now: DateTime<Utc>,
    ) -> Option<Result<ReminderReport, ReminderError>> {
        let Ok(_guard) = self.scan_lock.try_lock() else {
            debug!("Reminder scan already running, skipping tick");
            return None;
        };
        Some(self.scan(now).await)
    }

    #[instrument(skip(self))]
    async fn scan(&self, now: DateTime<Utc>) -> Result<ReminderReport, ReminderError> {
        let settings = self.settings.get().await?;
        if !settings.reminders_enabled {
            debug!("Reminders disabled, nothing to do");
            return Ok(ReminderReport::default());
        }

        let window_min = settings.reminder_window_min_minutes;
        let window_max = settings.reminder_window_max_minutes;
        let local_now = time::clinic_local(self.clinic_offset, now);

        let today = local_now.date();
        let horizon = (local_now + chrono::Duration::minutes(window_max)).date();
        let mut dates = vec![today];
        if horizon != today {
            dates.push(horizon);
        }

        let candidates = self.appointments.reminder_candidates(&dates).await?;
        let mut report = ReminderReport {
            enabled: true,
            candidates: candidates.len(),
            ..Default::default()
        };

        for appointment in &candidates {
            let delta = (appointment.local_start() - local_now).num_minutes();

            // Not yet due, or already started.
            if delta > window_max || delta < 0 {
                continue;
            }
            if delta < window_min {
                debug!(
                    "Reminder window missed for appointment {} ({} minutes to start)",
                    appointment.id, delta
                );
                report.missed += 1;
                continue;
            }

            if self.remind(appointment, local_now).await {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.sent > 0 || report.failed > 0 {
            info!(
                "Reminder scan: {} candidates, {} sent, {} failed, {} missed",
                report.candidates, report.sent, report.failed, report.missed
            );
        }
        Ok(report)
    }

    /// Failures are contained here so the batch continues.
    async fn remind(&self, appointment: &Appointment, local_now: NaiveDateTime) -> bool {
        let delivered = self
            .dispatcher
            .send_reminder(appointment, &appointment.patient(), &appointment.doctor())
            .await;

        if !delivered {
            warn!(
                "Reminder for appointment {} was not delivered; will retry next tick",
                appointment.id
            );
            return false;
        }

        match self.appointments.mark_reminder_sent(appointment.id).await {
            Ok(_) => {
                debug!(
                    "Reminder sent for appointment {} at {}",
                    appointment.id,
                    time::format_hhmm(&local_now.time())
                );
                true
            }
            Err(e) => {
                error!(
                    "Reminder for appointment {} delivered but flag not stored: {}",
                    appointment.id, e
                );
                false
            }
        }
    }

    /// Spawns the recurring task. Ticks that find a scan running are skipped.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Reminder scheduler started (every {:?})", scheduler.interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("Reminder scheduler received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Some(Err(e)) = scheduler.try_tick_at(Utc::now()).await {
                            error!("Reminder scan failed: {}", e);
                        }
                    }
                }
            }

            info!("Reminder scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, task }
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the task and waits for it to finish its current scan.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Reminder scheduler task ended abnormally: {}", e);
        }
    }
}
