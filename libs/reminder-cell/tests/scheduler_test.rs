// libs/reminder-cell/tests/scheduler_test.rs
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentLifecycle, AppointmentStatus, BookAppointmentRequest,
    ConsultationMode, EventBus, InMemoryAppointmentRepository, NotificationDispatcher, Recipient,
};
use availability_cell::{ConfigureDayRequest, InMemoryAvailabilityRepository, SlotStore, TimeWindow};
use reminder_cell::{ReminderReport, ReminderScheduler};
use shared_config::AppConfig;
use shared_database::{
    ClinicSettings, InMemorySettingsRepository, SettingsService, UpdateSettingsRequest,
};
use shared_models::auth::Actor;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(t(h, m)))
}

#[derive(Default)]
struct RecordingDispatcher {
    calls: AtomicUsize,
    delivered: Mutex<Vec<Uuid>>,
    failing_patients: Mutex<HashSet<Uuid>>,
    fail_next: AtomicUsize,
    entered: Notify,
    gate: Option<Arc<Notify>>,
}

impl RecordingDispatcher {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> Vec<Uuid> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_reminder(
        &self,
        appointment: &Appointment,
        patient: &Recipient,
        _doctor: &Recipient,
    ) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.failing_patients.lock().unwrap().contains(&patient.user_id) {
            return false;
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return false;
        }

        self.delivered.lock().unwrap().push(appointment.id);
        true
    }

    async fn send_status_change(
        &self,
        _appointment: &Appointment,
        _recipient: &Recipient,
        _new_status: AppointmentStatus,
    ) {
    }
}

struct Harness {
    lifecycle: Arc<AppointmentLifecycle>,
    slots: Arc<SlotStore>,
    settings: Arc<SettingsService>,
    dispatcher: Arc<RecordingDispatcher>,
    scheduler: Arc<ReminderScheduler>,
}

fn harness_with(dispatcher: RecordingDispatcher) -> Harness {
    let config = AppConfig::default();
    let slots = Arc::new(SlotStore::new(
        Arc::new(InMemoryAvailabilityRepository::new()),
        30,
    ));
    let lifecycle = Arc::new(AppointmentLifecycle::new(
        Arc::new(InMemoryAppointmentRepository::new()),
        slots.clone(),
        EventBus::default(),
        &config,
    ));
    let settings = Arc::new(SettingsService::new(
        Arc::new(InMemorySettingsRepository::new()),
        ClinicSettings::from_config(&config),
    ));
    let dispatcher = Arc::new(dispatcher);
    let scheduler = Arc::new(
        ReminderScheduler::new(lifecycle.clone(), dispatcher.clone(), settings.clone(), &config)
            .with_interval(Duration::from_millis(10)),
    );

    Harness {
        lifecycle,
        slots,
        settings,
        dispatcher,
        scheduler,
    }
}

fn harness() -> Harness {
    harness_with(RecordingDispatcher::default())
}

async fn confirmed(h: &Harness, date: NaiveDate, start: NaiveTime) -> Appointment {
    let doctor = Actor::doctor(Uuid::new_v4());
    let patient = Actor::patient(Uuid::new_v4());
    let booked = h
        .lifecycle
        .book(
            BookAppointmentRequest {
                doctor_id: doctor.user_id,
                patient_id: None,
                date,
                slot: TimeWindow::new(start, start + chrono::Duration::minutes(30)),
                consultation_mode: ConsultationMode::InPerson,
                symptoms: "Follow-up".to_string(),
                kind: None,
                duration_minutes: None,
            },
            &patient,
        )
        .await
        .unwrap();

    h.lifecycle
        .transition(booked.id, AppointmentStatus::Confirmed, &doctor, None)
        .await
        .unwrap()
}

async fn reminder_sent(h: &Harness, id: Uuid) -> bool {
    h.lifecycle.find(id).await.unwrap().unwrap().reminder_sent
}

#[tokio::test]
async fn reminds_once_across_overlapping_ticks() {
    let h = harness();
    let appointment = confirmed(&h, monday(), t(10, 0)).await;

    let first = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(first.sent, 1);
    assert!(reminder_sent(&h, appointment.id).await);

    let second = h.scheduler.check_reminders_at(at(monday(), 9, 5)).await.unwrap();
    assert_eq!(second.sent, 0);
    assert_eq!(second.candidates, 0);

    assert_eq!(h.dispatcher.calls(), 1);
    assert_eq!(h.dispatcher.delivered(), vec![appointment.id]);
}

#[tokio::test]
async fn ignores_appointments_outside_the_window() {
    let h = harness();
    let appointment = confirmed(&h, monday(), t(11, 0)).await;

    let early = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(early.candidates, 1);
    assert_eq!(early.sent, 0);
    assert_eq!(early.missed, 0);

    let late = h.scheduler.check_reminders_at(at(monday(), 10, 30)).await.unwrap();
    assert_eq!(late.missed, 1);
    assert_eq!(late.sent, 0);

    let started = h.scheduler.check_reminders_at(at(monday(), 11, 5)).await.unwrap();
    assert_eq!(started.candidates, 1);
    assert_eq!(started.missed, 0);
    assert_eq!(started.sent, 0);

    assert_eq!(h.dispatcher.calls(), 0);
    assert!(!reminder_sent(&h, appointment.id).await);
}

#[tokio::test]
async fn pending_appointments_are_not_reminded() {
    let h = harness();
    let doctor = Actor::doctor(Uuid::new_v4());
    let patient = Actor::patient(Uuid::new_v4());
    h.lifecycle
        .book(
            BookAppointmentRequest {
                doctor_id: doctor.user_id,
                patient_id: None,
                date: monday(),
                slot: TimeWindow::new(t(10, 0), t(10, 30)),
                consultation_mode: ConsultationMode::InPerson,
                symptoms: "Headache".to_string(),
                kind: None,
                duration_minutes: None,
            },
            &patient,
        )
        .await
        .unwrap();

    let report = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(h.dispatcher.calls(), 0);
}

#[tokio::test]
async fn failed_dispatch_is_retried_on_the_next_tick() {
    let h = harness();
    h.dispatcher.fail_next.store(1, Ordering::SeqCst);
    let appointment = confirmed(&h, monday(), t(10, 0)).await;

    let first = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(first.failed, 1);
    assert!(!reminder_sent(&h, appointment.id).await);

    let second = h.scheduler.check_reminders_at(at(monday(), 9, 5)).await.unwrap();
    assert_eq!(second.sent, 1);
    assert!(reminder_sent(&h, appointment.id).await);
    assert_eq!(h.dispatcher.calls(), 2);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let h = harness();
    let failing = confirmed(&h, monday(), t(10, 0)).await;
    let healthy = confirmed(&h, monday(), t(10, 0)).await;
    h.dispatcher
        .failing_patients
        .lock()
        .unwrap()
        .insert(failing.patient_id);

    let report = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(
        report,
        ReminderReport {
            enabled: true,
            candidates: 2,
            sent: 1,
            failed: 1,
            missed: 0,
        }
    );
    assert!(reminder_sent(&h, healthy.id).await);
    assert!(!reminder_sent(&h, failing.id).await);
}

#[tokio::test]
async fn disabled_reminders_make_ticks_a_no_op() {
    let h = harness();
    let appointment = confirmed(&h, monday(), t(10, 0)).await;
    h.settings
        .update(UpdateSettingsRequest {
            reminders_enabled: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    let report = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert!(!report.enabled);
    assert_eq!(h.dispatcher.calls(), 0);
    assert!(!reminder_sent(&h, appointment.id).await);
}

#[tokio::test]
async fn window_is_read_from_settings_on_each_scan() {
    let h = harness();
    confirmed(&h, monday(), t(11, 0)).await;

    let before = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(before.sent, 0);

    h.settings
        .update(UpdateSettingsRequest {
            reminder_window_max_minutes: Some(150),
            ..Default::default()
        })
        .await
        .unwrap();

    let after = h.scheduler.check_reminders_at(at(monday(), 9, 0)).await.unwrap();
    assert_eq!(after.sent, 1);
}

#[tokio::test]
async fn window_crossing_midnight_includes_tomorrow() {
    let h = harness();
    let tuesday = monday().succ_opt().unwrap();
    let doctor = Actor::doctor(Uuid::new_v4());
    let patient = Actor::patient(Uuid::new_v4());
    h.slots
        .configure_day(
            doctor.user_id,
            tuesday,
            ConfigureDayRequest {
                working_hours: Some(TimeWindow::new(t(0, 0), t(8, 0))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let booked = h
        .lifecycle
        .book(
            BookAppointmentRequest {
                doctor_id: doctor.user_id,
                patient_id: None,
                date: tuesday,
                slot: TimeWindow::new(t(0, 30), t(1, 0)),
                consultation_mode: ConsultationMode::Video,
                symptoms: "Night shift check-in".to_string(),
                kind: None,
                duration_minutes: None,
            },
            &patient,
        )
        .await
        .unwrap();
    h.lifecycle
        .transition(booked.id, AppointmentStatus::Confirmed, &doctor, None)
        .await
        .unwrap();

    let report = h
        .scheduler
        .check_reminders_at(at(monday(), 23, 30))
        .await
        .unwrap();
    assert_eq!(report.sent, 1);
    assert!(reminder_sent(&h, booked.id).await);
}

#[tokio::test]
async fn overlapping_tick_is_skipped_while_a_scan_runs() {
    let gate = Arc::new(Notify::new());
    let h = harness_with(RecordingDispatcher::gated(gate.clone()));
    confirmed(&h, monday(), t(10, 0)).await;

    let running = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.check_reminders_at(at(monday(), 9, 0)).await })
    };
    h.dispatcher.entered.notified().await;

    let skipped = h.scheduler.try_tick_at(at(monday(), 9, 1)).await;
    assert!(skipped.is_none());

    gate.notify_one();
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(h.dispatcher.calls(), 1);

    let after = h.scheduler.try_tick_at(at(monday(), 9, 2)).await;
    assert_matches!(after, Some(Ok(ReminderReport { sent: 0, .. })));
}

#[tokio::test]
async fn scheduler_stops_cleanly_on_shutdown() {
    let h = harness();
    let handle = h.scheduler.clone().start();

    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("scheduler did not stop");
}
