// libs/queue-cell/tests/queue_manager_test.rs
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use tokio::sync::watch;
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentLifecycle, AppointmentStatus, BookAppointmentRequest,
    ConsultationMode, EventBus, InMemoryAppointmentRepository, RescheduleRequest,
};
use availability_cell::{InMemoryAvailabilityRepository, SlotStore, TimeWindow};
use queue_cell::{
    spawn_queue_listener, InMemoryQueueRepository, QueueDay, QueueEntryStatus, QueueError,
    QueueManager, QueueRepository, UpdateEntryStatusRequest, UpsertEntryRequest,
};
use shared_config::AppConfig;
use shared_models::auth::Actor;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 8).unwrap()
}

fn half_hour(hour: u32, minute: u32) -> TimeWindow {
    TimeWindow::new(t(hour, minute), t(hour, minute) + chrono::Duration::minutes(30))
}

struct Harness {
    lifecycle: Arc<AppointmentLifecycle>,
    queue: Arc<QueueManager>,
    queue_repo: Arc<InMemoryQueueRepository>,
    doctor: Actor,
}

fn harness() -> Harness {
    let config = AppConfig::default();
    let slots = Arc::new(SlotStore::new(
        Arc::new(InMemoryAvailabilityRepository::new()),
        30,
    ));
    let lifecycle = Arc::new(AppointmentLifecycle::new(
        Arc::new(InMemoryAppointmentRepository::new()),
        slots,
        EventBus::default(),
        &config,
    ));
    let queue_repo = Arc::new(InMemoryQueueRepository::new());
    let queue = Arc::new(QueueManager::new(queue_repo.clone(), lifecycle.clone(), &config));

    Harness {
        lifecycle,
        queue,
        queue_repo,
        doctor: Actor::doctor(Uuid::new_v4()),
    }
}

async fn confirmed_at(h: &Harness, hour: u32, minute: u32) -> Appointment {
    let patient = Actor::patient(Uuid::new_v4());
    let booked = h
        .lifecycle
        .book(
            BookAppointmentRequest {
                doctor_id: h.doctor.user_id,
                patient_id: None,
                date: monday(),
                slot: half_hour(hour, minute),
                consultation_mode: ConsultationMode::InPerson,
                symptoms: "Back pain".to_string(),
                kind: None,
                duration_minutes: None,
            },
            &patient,
        )
        .await
        .unwrap();

    h.lifecycle
        .transition(booked.id, AppointmentStatus::Confirmed, &h.doctor, None)
        .await
        .unwrap()
}

async fn reschedule(
    h: &Harness,
    appointment: &Appointment,
    date: NaiveDate,
    slot: TimeWindow,
    requires_confirmation: bool,
) -> Appointment {
    h.lifecycle
        .reschedule(
            appointment.id,
            RescheduleRequest {
                date,
                slot,
                requires_confirmation,
                notes: None,
            },
            &h.doctor,
        )
        .await
        .unwrap()
}

async fn sync(h: &Harness, date: NaiveDate) -> QueueDay {
    h.queue
        .sync_with_appointments(h.doctor.user_id, date, &h.doctor)
        .await
        .unwrap()
}

fn status_update(status: QueueEntryStatus) -> UpdateEntryStatusRequest {
    UpdateEntryStatusRequest {
        status,
        priority: None,
        notes: None,
    }
}

#[tokio::test]
async fn sync_inserts_confirmed_appointments_in_order() {
    let h = harness();
    let late = confirmed_at(&h, 10, 0).await;
    let early = confirmed_at(&h, 9, 0).await;
    h.lifecycle
        .book(
            BookAppointmentRequest {
                doctor_id: h.doctor.user_id,
                patient_id: None,
                date: monday(),
                slot: TimeWindow::new(t(11, 0), t(11, 30)),
                consultation_mode: ConsultationMode::Video,
                symptoms: "Rash".to_string(),
                kind: None,
                duration_minutes: None,
            },
            &Actor::patient(Uuid::new_v4()),
        )
        .await
        .unwrap();

    let day = h
        .queue
        .sync_with_appointments(h.doctor.user_id, monday(), &h.doctor)
        .await
        .unwrap();

    let order: Vec<_> = day.entries.iter().map(|e| e.appointment_id).collect();
    assert_eq!(order, vec![early.id, late.id]);
    let waits: Vec<_> = day.entries.iter().map(|e| e.estimated_wait_time).collect();
    assert_eq!(waits, vec![Some(0), Some(15)]);

    // Idempotent.
    let again = h
        .queue
        .sync_with_appointments(h.doctor.user_id, monday(), &h.doctor)
        .await
        .unwrap();
    assert_eq!(again.entries.len(), 2);
}

#[tokio::test]
async fn sync_converges_without_regressing() {
    let h = harness();
    let visit = confirmed_at(&h, 9, 0).await;
    h.queue
        .sync_with_appointments(h.doctor.user_id, monday(), &h.doctor)
        .await
        .unwrap();

    h.lifecycle
        .transition(visit.id, AppointmentStatus::Cancelled, &h.doctor, None)
        .await
        .unwrap();
    let day = h
        .queue
        .sync_with_appointments(h.doctor.user_id, monday(), &h.doctor)
        .await
        .unwrap();

    let entry = day.entry(visit.id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Cancelled);
    assert_eq!(day.waiting_count(), 0);
}

#[tokio::test]
async fn in_progress_is_exclusive_and_completion_updates_average() {
    let h = harness();
    let first = confirmed_at(&h, 9, 0).await;
    let second = confirmed_at(&h, 9, 30).await;
    h.queue
        .sync_with_appointments(h.doctor.user_id, monday(), &h.doctor)
        .await
        .unwrap();

    let day = h
        .queue
        .update_entry_status(first.id, status_update(QueueEntryStatus::InProgress), &h.doctor)
        .await
        .unwrap();
    assert_eq!(day.current_entry().unwrap().appointment_id, first.id);
    assert!(day.entries[0].start_time.is_some());

    assert_matches!(
        h.queue
            .update_entry_status(second.id, status_update(QueueEntryStatus::InProgress), &h.doctor)
            .await,
        Err(QueueError::AnotherInProgress(id)) if id == first.id
    );

    let day = h
        .queue
        .update_entry_status(first.id, status_update(QueueEntryStatus::Completed), &h.doctor)
        .await
        .unwrap();
    let done = day.entry(first.id).unwrap();
    assert!(done.end_time.is_some());
    // A visit of well under a minute: round((15 + 0) / 2).
    assert_eq!(day.average_consultation_time, 8);

    assert_matches!(
        h.queue
            .update_entry_status(first.id, status_update(QueueEntryStatus::Waiting), &h.doctor)
            .await,
        Err(QueueError::InvalidStatusTransition { .. })
    );
}

#[tokio::test]
async fn priority_bump_reorders_queue() {
    let h = harness();
    let early = confirmed_at(&h, 9, 0).await;
    let late = confirmed_at(&h, 10, 0).await;
    h.queue
        .sync_with_appointments(h.doctor.user_id, monday(), &h.doctor)
        .await
        .unwrap();

    let day = h
        .queue
        .update_entry_status(
            late.id,
            UpdateEntryStatusRequest {
                status: QueueEntryStatus::Waiting,
                priority: Some(5),
                notes: Some("Severe pain".to_string()),
            },
            &h.doctor,
        )
        .await
        .unwrap();

    assert_eq!(day.entries[0].appointment_id, late.id);
    assert_eq!(day.entries[0].estimated_wait_time, Some(0));
    assert_eq!(day.entries[1].appointment_id, early.id);
    assert_eq!(day.entries[1].estimated_wait_time, Some(15));
}

#[tokio::test]
async fn upsert_inserts_then_merges() {
    let h = harness();
    let appointment_id = Uuid::new_v4();

    assert_matches!(
        h.queue
            .upsert_entry(
                h.doctor.user_id,
                monday(),
                UpsertEntryRequest {
                    appointment_id,
                    ..Default::default()
                },
                &h.doctor,
            )
            .await,
        Err(QueueError::ValidationError(_))
    );

    let day = h
        .queue
        .upsert_entry(
            h.doctor.user_id,
            monday(),
            UpsertEntryRequest {
                appointment_id,
                patient_id: Some(Uuid::new_v4()),
                scheduled_time: Some(t(14, 0)),
                ..Default::default()
            },
            &h.doctor,
        )
        .await
        .unwrap();
    let entry = day.entry(appointment_id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Waiting);
    assert_eq!(entry.consultation_type, ConsultationMode::InPerson);
    assert!(entry.check_in_time.is_none());

    let day = h
        .queue
        .upsert_entry(
            h.doctor.user_id,
            monday(),
            UpsertEntryRequest {
                appointment_id,
                checked_in: true,
                priority: Some(1),
                ..Default::default()
            },
            &h.doctor,
        )
        .await
        .unwrap();
    assert_eq!(day.entries.len(), 1);
    let entry = day.entry(appointment_id).unwrap();
    assert_eq!(entry.priority, 1);
    assert_eq!(entry.scheduled_time, t(14, 0));
    assert!(entry.check_in_time.is_some());
}

#[tokio::test]
async fn delay_is_bounded_and_doctor_scoped() {
    let h = harness();

    let day = h
        .queue
        .set_delay(h.doctor.user_id, 25, &h.doctor)
        .await
        .unwrap();
    assert_eq!(day.current_delay, 25);

    assert_matches!(
        h.queue.set_delay(h.doctor.user_id, 481, &h.doctor).await,
        Err(QueueError::ValidationError(_))
    );
    assert_matches!(
        h.queue
            .set_delay(h.doctor.user_id, 10, &Actor::doctor(Uuid::new_v4()))
            .await,
        Err(QueueError::Forbidden(_))
    );
    assert_matches!(
        h.queue
            .sync_with_appointments(h.doctor.user_id, monday(), &Actor::patient(Uuid::new_v4()))
            .await,
        Err(QueueError::Forbidden(_))
    );
}

#[tokio::test]
async fn listener_reconciles_pushed_events() {
    let h = harness();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = spawn_queue_listener(
        h.queue.clone(),
        h.lifecycle.events().subscribe(),
        shutdown_rx,
    );

    let visit = confirmed_at(&h, 15, 0).await;
    h.lifecycle
        .transition(visit.id, AppointmentStatus::InProgress, &h.doctor, None)
        .await
        .unwrap();

    let mut status = None;
    for _ in 0..50 {
        let day = h.queue.get_status(h.doctor.user_id, monday()).await.unwrap();
        if day.current_entry.is_some() {
            status = Some(day);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = status.expect("listener never applied the event");
    assert_eq!(status.current_entry.unwrap().appointment_id, visit.id);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn sync_follows_a_same_day_reschedule() {
    let h = harness();
    let moved = confirmed_at(&h, 9, 0).await;
    let stays = confirmed_at(&h, 10, 0).await;
    let day = sync(&h, monday()).await;
    assert_eq!(day.entries[0].appointment_id, moved.id);

    reschedule(&h, &moved, monday(), half_hour(11, 0), false).await;
    let day = sync(&h, monday()).await;

    let order: Vec<_> = day.entries.iter().map(|e| e.appointment_id).collect();
    assert_eq!(order, vec![stays.id, moved.id]);
    let entry = day.entry(moved.id).unwrap();
    assert_eq!(entry.scheduled_time, t(11, 0));
    assert_eq!(entry.status, QueueEntryStatus::Waiting);
    assert_eq!(entry.estimated_wait_time, Some(15));
}

#[tokio::test]
async fn reschedule_awaiting_confirmation_leaves_the_queue() {
    let h = harness();
    let visit = confirmed_at(&h, 9, 0).await;
    sync(&h, monday()).await;

    let moved = reschedule(&h, &visit, monday(), half_hour(11, 0), true).await;
    assert_eq!(moved.status, AppointmentStatus::PendingPatientConfirmation);

    let day = sync(&h, monday()).await;
    assert!(day.entry(visit.id).is_none());
    assert_eq!(day.waiting_count(), 0);

    // Once the patient accepts, the visit queues at its new time.
    h.lifecycle
        .transition(visit.id, AppointmentStatus::Confirmed, &Actor::patient(visit.patient_id), None)
        .await
        .unwrap();
    let day = sync(&h, monday()).await;
    assert_eq!(day.entry(visit.id).unwrap().scheduled_time, t(11, 0));
}

#[tokio::test]
async fn sync_drops_entries_moved_to_another_day() {
    let h = harness();
    let visit = confirmed_at(&h, 9, 0).await;
    let walk_in = Uuid::new_v4();
    h.queue
        .upsert_entry(
            h.doctor.user_id,
            monday(),
            UpsertEntryRequest {
                appointment_id: walk_in,
                patient_id: Some(Uuid::new_v4()),
                scheduled_time: Some(t(12, 0)),
                ..Default::default()
            },
            &h.doctor,
        )
        .await
        .unwrap();
    sync(&h, monday()).await;

    reschedule(&h, &visit, tuesday(), half_hour(9, 0), false).await;

    let monday_queue = sync(&h, monday()).await;
    assert!(monday_queue.entry(visit.id).is_none());
    assert!(monday_queue.entry(walk_in).is_some());

    let tuesday_queue = sync(&h, tuesday()).await;
    assert_eq!(
        tuesday_queue.entry(visit.id).map(|e| e.status),
        Some(QueueEntryStatus::Waiting)
    );
}

#[tokio::test]
async fn listener_moves_rescheduled_entries_between_days() {
    let h = harness();
    let visit = confirmed_at(&h, 9, 0).await;
    sync(&h, monday()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = spawn_queue_listener(
        h.queue.clone(),
        h.lifecycle.events().subscribe(),
        shutdown_rx,
    );

    reschedule(&h, &visit, tuesday(), half_hour(14, 0), false).await;

    let mut moved = false;
    for _ in 0..50 {
        let monday_queue = h.queue.get_status(h.doctor.user_id, monday()).await.unwrap();
        let tuesday_queue = h.queue.get_status(h.doctor.user_id, tuesday()).await.unwrap();
        if monday_queue.queue.entry(visit.id).is_none()
            && tuesday_queue.queue.entry(visit.id).is_some()
        {
            moved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(moved, "entry never moved from monday to tuesday");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn unconfirmed_bookings_do_not_touch_the_queue() {
    let h = harness();
    let booked = h
        .lifecycle
        .book(
            BookAppointmentRequest {
                doctor_id: h.doctor.user_id,
                patient_id: None,
                date: monday(),
                slot: half_hour(16, 0),
                consultation_mode: ConsultationMode::Video,
                symptoms: "Migraine".to_string(),
                kind: None,
                duration_minutes: None,
            },
            &Actor::patient(Uuid::new_v4()),
        )
        .await
        .unwrap();

    let day = h.queue.reconcile_appointment(&booked).await.unwrap();
    assert!(day.entries.is_empty());
    assert!(h
        .queue_repo
        .get_day(h.doctor.user_id, monday())
        .await
        .unwrap()
        .is_none());
}
