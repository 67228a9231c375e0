// libs/queue-cell/src/services/manager.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentEvent, AppointmentLifecycle, AppointmentStatus};
use shared_config::AppConfig;
use shared_models::auth::Actor;
use shared_models::time;
use shared_utils::KeyedLocks;

use crate::error::QueueError;
use crate::models::{
    QueueDay, QueueEntry, QueueEntryStatus, QueueStatus, UpdateEntryStatusRequest,
    UpsertEntryRequest, MAX_DELAY_MINUTES,
};
use crate::repository::QueueRepository;
use crate::services::ordering::{calculate_wait_times, rolling_average, sort_entries};

/// Owns queue ordering and timestamps. Reads appointment state, never writes it.
pub struct QueueManager {
    repo: Arc<dyn QueueRepository>,
    appointments: Arc<AppointmentLifecycle>,
    day_locks: KeyedLocks<(Uuid, NaiveDate)>,
    clinic_offset: FixedOffset,
}

impl QueueManager {
    pub fn new(
        repo: Arc<dyn QueueRepository>,
        appointments: Arc<AppointmentLifecycle>,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            appointments,
            day_locks: KeyedLocks::new(),
            clinic_offset: time::clinic_offset(config.clinic_utc_offset_minutes),
        }
    }

    pub async fn get_status(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<QueueStatus, QueueError> {
        let day = self
            .repo
            .get_day(doctor_id, date)
            .await?
            .unwrap_or_else(|| QueueDay::new(doctor_id, date));
        Ok(day.into())
    }

    /// Loads (or starts) the day under its lock, applies `mutate`, re-sorts,
    /// recomputes waits and saves.
    async fn with_day<F>(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        mutate: F,
    ) -> Result<QueueDay, QueueError>
    where
        F: FnOnce(&mut QueueDay) -> Result<(), QueueError>,
    {
        self.with_day_if(doctor_id, date, |day| mutate(day).map(|()| true))
            .await
    }

    /// Like `with_day`, but `mutate` reports whether it changed anything and
    /// an untouched day is returned without being written.
    async fn with_day_if<F>(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        mutate: F,
    ) -> Result<QueueDay, QueueError>
    where
        F: FnOnce(&mut QueueDay) -> Result<bool, QueueError>,
    {
        let _guard = self.day_locks.lock((doctor_id, date)).await;

        let mut day = self
            .repo
            .get_day(doctor_id, date)
            .await?
            .unwrap_or_else(|| QueueDay::new(doctor_id, date));

        if !mutate(&mut day)? {
            return Ok(day);
        }

        sort_entries(&mut day.entries);
        calculate_wait_times(&mut day.entries, day.average_consultation_time);
        day.last_updated = Utc::now();

        self.repo.save_day(&day).await
    }

    #[instrument(skip(self, request), fields(appointment_id = %request.appointment_id))]
    pub async fn upsert_entry(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        request: UpsertEntryRequest,
        actor: &Actor,
    ) -> Result<QueueDay, QueueError> {
        actor.require_doctor_access(doctor_id)?;

        self.with_day(doctor_id, date, |day| {
            let now = Utc::now();
            match day.entry_mut(request.appointment_id) {
                Some(entry) => {
                    if let Some(patient_id) = request.patient_id {
                        entry.patient_id = patient_id;
                    }
                    if let Some(scheduled_time) = request.scheduled_time {
                        entry.scheduled_time = scheduled_time;
                    }
                    if let Some(consultation_type) = request.consultation_type {
                        entry.consultation_type = consultation_type;
                    }
                    if let Some(priority) = request.priority {
                        entry.priority = priority;
                    }
                    if request.notes.is_some() {
                        entry.notes = request.notes;
                    }
                    if request.checked_in && entry.check_in_time.is_none() {
                        entry.check_in_time = Some(now);
                    }
                    entry.last_updated = now;
                    debug!("Merged queue entry {}", request.appointment_id);
                }
                None => {
                    let (Some(patient_id), Some(scheduled_time)) =
                        (request.patient_id, request.scheduled_time)
                    else {
                        return Err(QueueError::ValidationError(
                            "patient_id and scheduled_time are required for a new entry"
                                .to_string(),
                        ));
                    };

                    let mut entry = QueueEntry::new(request.appointment_id, patient_id, scheduled_time);
                    entry.consultation_type = request.consultation_type.unwrap_or_default();
                    entry.priority = request.priority.unwrap_or(0);
                    entry.notes = request.notes;
                    entry.check_in_time = request.checked_in.then_some(now);
                    day.entries.push(entry);
                    info!("Added appointment {} to queue {}", request.appointment_id, day.date_key);
                }
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_entry_status(
        &self,
        appointment_id: Uuid,
        request: UpdateEntryStatusRequest,
        actor: &Actor,
    ) -> Result<QueueDay, QueueError> {
        let appointment = self
            .appointments
            .find(appointment_id)
            .await?
            .ok_or(QueueError::EntryNotFound(appointment_id))?;
        actor.require_doctor_access(appointment.doctor_id)?;

        self.with_day(appointment.doctor_id, appointment.date, |day| {
            let average = day.average_consultation_time;
            let other_in_progress = day
                .current_entry()
                .map(|entry| entry.appointment_id)
                .filter(|id| *id != appointment_id);

            let entry = day
                .entry_mut(appointment_id)
                .ok_or(QueueError::EntryNotFound(appointment_id))?;

            if request.status != entry.status {
                if !entry.status.can_transition_to(request.status) {
                    return Err(QueueError::InvalidStatusTransition {
                        from: entry.status,
                        to: request.status,
                    });
                }
                if request.status == QueueEntryStatus::InProgress {
                    if let Some(current) = other_in_progress {
                        return Err(QueueError::AnotherInProgress(current));
                    }
                }
            }

            if let Some(priority) = request.priority {
                entry.priority = priority;
            }
            if request.notes.is_some() {
                entry.notes = request.notes;
            }

            let observed = apply_status(entry, request.status);
            if let Some(minutes) = observed {
                day.average_consultation_time = rolling_average(average, minutes);
                debug!(
                    "Average consultation time {} -> {} after {} minute visit",
                    average, day.average_consultation_time, minutes
                );
            }
            Ok(())
        })
        .await
    }

    /// Pull path: insert confirmed/in-progress appointments not yet present,
    /// converge existing entries and drop waiting entries whose appointment
    /// moved to another day.
    #[instrument(skip(self))]
    pub async fn sync_with_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        actor: &Actor,
    ) -> Result<QueueDay, QueueError> {
        actor.require_doctor_access(doctor_id)?;

        let appointments = self
            .appointments
            .list_for_doctor_day(doctor_id, date, &[])
            .await?;
        let moved = self.moved_away(doctor_id, date, &appointments).await?;

        let day = self
            .with_day(doctor_id, date, |day| {
                for appointment in appointments.iter().chain(&moved) {
                    converge(day, appointment);
                }
                Ok(())
            })
            .await?;

        info!(
            "Queue {} for doctor {} synced: {} entries",
            day.date_key,
            doctor_id,
            day.entries.len()
        );
        Ok(day)
    }

    /// Appointments behind waiting entries of the stored day that no longer
    /// list under it. Entries without an appointment are left alone.
    async fn moved_away(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        listed: &[Appointment],
    ) -> Result<Vec<Appointment>, QueueError> {
        let Some(day) = self.repo.get_day(doctor_id, date).await? else {
            return Ok(Vec::new());
        };
        let listed: HashSet<Uuid> = listed.iter().map(|a| a.id).collect();

        let mut moved = Vec::new();
        for entry in day.entries.iter().filter(|e| {
            e.status == QueueEntryStatus::Waiting && !listed.contains(&e.appointment_id)
        }) {
            if let Some(appointment) = self.appointments.find(entry.appointment_id).await? {
                moved.push(appointment);
            }
        }
        Ok(moved)
    }

    /// Push path: one appointment's new state, applied to its day.
    pub async fn reconcile_appointment(
        &self,
        appointment: &Appointment,
    ) -> Result<QueueDay, QueueError> {
        self.with_day_if(appointment.doctor_id, appointment.date, |day| {
            Ok(converge(day, appointment))
        })
        .await
    }

    /// Applies an event to the appointment's day and, after a move, clears it
    /// from the day it left.
    pub async fn reconcile_event(&self, event: &AppointmentEvent) -> Result<(), QueueError> {
        let appointment = &event.appointment;
        if let Some(previous) = event.previous_date.filter(|d| *d != appointment.date) {
            self.with_day_if(appointment.doctor_id, previous, |day| {
                Ok(converge(day, appointment))
            })
            .await?;
        }
        self.reconcile_appointment(appointment).await?;
        Ok(())
    }

    /// Sets today's delay for the doctor.
    pub async fn set_delay(
        &self,
        doctor_id: Uuid,
        minutes: u32,
        actor: &Actor,
    ) -> Result<QueueDay, QueueError> {
        actor.require_doctor_access(doctor_id)?;
        if minutes > MAX_DELAY_MINUTES {
            return Err(QueueError::ValidationError(format!(
                "Delay must be between 0 and {} minutes",
                MAX_DELAY_MINUTES
            )));
        }

        let today = time::clinic_local(self.clinic_offset, Utc::now()).date();
        let day = self
            .with_day(doctor_id, today, |day| {
                day.current_delay = minutes;
                Ok(())
            })
            .await?;

        info!("Doctor {} running {} minutes late on {}", doctor_id, minutes, day.date_key);
        Ok(day)
    }
}

/// Applies timestamps for `status`. Returns the observed visit length when a
/// started visit completes.
fn apply_status(entry: &mut QueueEntry, status: QueueEntryStatus) -> Option<u32> {
    let now = Utc::now();
    let mut observed = None;

    if entry.status != status {
        match status {
            QueueEntryStatus::InProgress => {
                entry.start_time.get_or_insert(now);
            }
            QueueEntryStatus::Completed => {
                entry.end_time = Some(now);
                observed = entry
                    .start_time
                    .map(|started| (now - started).num_minutes().max(0) as u32);
            }
            _ => {}
        }
        entry.status = status;
    }

    entry.last_updated = now;
    observed
}

/// Moves the day toward `appointment`'s state without ever regressing a
/// started entry. Returns whether the day changed.
fn converge(day: &mut QueueDay, appointment: &Appointment) -> bool {
    let target = if appointment.date == day.date {
        QueueEntryStatus::from_appointment(appointment.status)
    } else {
        None
    };
    let Some(target) = target else {
        return drop_waiting(day, appointment.id);
    };

    let other_in_progress = day
        .current_entry()
        .map(|entry| entry.appointment_id)
        .filter(|id| *id != appointment.id);
    let average = day.average_consultation_time;

    match day.entry_mut(appointment.id) {
        Some(entry) => {
            let mut changed = false;
            if entry.scheduled_time != appointment.slot.start {
                entry.scheduled_time = appointment.slot.start;
                changed = true;
            }
            if entry.consultation_type != appointment.consultation_mode {
                entry.consultation_type = appointment.consultation_mode;
                changed = true;
            }
            if changed {
                entry.last_updated = Utc::now();
            }

            if target.rank() <= entry.status.rank() {
                return changed;
            }
            if target == QueueEntryStatus::InProgress {
                if let Some(current) = other_in_progress {
                    warn!(
                        "Appointment {} started while {} is still in progress; leaving it waiting",
                        appointment.id, current
                    );
                    return changed;
                }
            }
            if let Some(minutes) = apply_status(entry, target) {
                day.average_consultation_time = rolling_average(average, minutes);
            }
            debug!("Queue entry {} converged to {}", appointment.id, target);
            true
        }
        None => {
            if !matches!(
                appointment.status,
                AppointmentStatus::Confirmed | AppointmentStatus::InProgress
            ) {
                return false;
            }
            if target == QueueEntryStatus::InProgress && other_in_progress.is_some() {
                warn!(
                    "Appointment {} is in progress alongside another visit; queued as waiting",
                    appointment.id
                );
            }

            let mut entry =
                QueueEntry::new(appointment.id, appointment.patient_id, appointment.slot.start);
            entry.consultation_type = appointment.consultation_mode;
            if target == QueueEntryStatus::InProgress && other_in_progress.is_none() {
                apply_status(&mut entry, target);
            }
            day.entries.push(entry);
            debug!("Queue entry {} inserted from appointment", appointment.id);
            true
        }
    }
}

/// Removes a waiting entry whose appointment no longer holds a visit on this day.
fn drop_waiting(day: &mut QueueDay, appointment_id: Uuid) -> bool {
    let before = day.entries.len();
    day.entries.retain(|entry| {
        entry.appointment_id != appointment_id || entry.status != QueueEntryStatus::Waiting
    });
    let dropped = day.entries.len() != before;
    if dropped {
        debug!("Queue entry {} dropped from {}", appointment_id, day.date_key);
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use appointment_cell::{AppointmentKind, ConsultationMode, PaymentStatus};
    use availability_cell::TimeWindow;
    use chrono::NaiveTime;

    fn appointment(status: AppointmentStatus, h: u32) -> Appointment {
        let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date,
            date_key: time::date_key(date),
            slot: TimeWindow::new(
                NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(h, 30, 0).unwrap(),
            ),
            kind: AppointmentKind::Regular,
            consultation_mode: ConsultationMode::Video,
            status,
            payment_status: PaymentStatus::Pending,
            duration_minutes: 30,
            symptoms: "Fever".to_string(),
            reminder_sent: false,
            status_history: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn converge_inserts_only_confirmed_or_started() {
        let mut day = QueueDay::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        converge(&mut day, &appointment(AppointmentStatus::Pending, 9));
        converge(&mut day, &appointment(AppointmentStatus::Cancelled, 10));
        assert!(day.entries.is_empty());

        let confirmed = appointment(AppointmentStatus::Confirmed, 11);
        converge(&mut day, &confirmed);
        let entry = day.entry(confirmed.id).unwrap();
        assert_eq!(entry.status, QueueEntryStatus::Waiting);
        assert_eq!(entry.priority, 0);
        assert_eq!(entry.consultation_type, ConsultationMode::Video);
    }

    #[test]
    fn converge_never_regresses() {
        let mut day = QueueDay::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        let mut visit = appointment(AppointmentStatus::InProgress, 9);
        converge(&mut day, &visit);
        assert_eq!(day.entries[0].status, QueueEntryStatus::InProgress);
        assert!(day.entries[0].start_time.is_some());

        visit.status = AppointmentStatus::Completed;
        converge(&mut day, &visit);
        assert_eq!(day.entries[0].status, QueueEntryStatus::Completed);

        visit.status = AppointmentStatus::Confirmed;
        converge(&mut day, &visit);
        assert_eq!(day.entries[0].status, QueueEntryStatus::Completed);
    }

    #[test]
    fn converge_keeps_single_in_progress() {
        let mut day = QueueDay::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        let first = appointment(AppointmentStatus::InProgress, 9);
        let mut second = appointment(AppointmentStatus::Confirmed, 10);
        converge(&mut day, &first);
        converge(&mut day, &second);

        second.status = AppointmentStatus::InProgress;
        converge(&mut day, &second);

        let active: Vec<_> = day
            .entries
            .iter()
            .filter(|e| e.status == QueueEntryStatus::InProgress)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].appointment_id, first.id);
    }

    #[test]
    fn converge_refreshes_time_and_drops_unheld_visits() {
        let mut day = QueueDay::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        let mut visit = appointment(AppointmentStatus::Confirmed, 9);
        assert!(converge(&mut day, &visit));
        assert!(!converge(&mut day, &visit));

        visit.slot = TimeWindow::new(
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        );
        visit.consultation_mode = ConsultationMode::InPerson;
        assert!(converge(&mut day, &visit));
        let entry = day.entry(visit.id).unwrap();
        assert_eq!(entry.scheduled_time, visit.slot.start);
        assert_eq!(entry.consultation_type, ConsultationMode::InPerson);

        visit.status = AppointmentStatus::PendingPatientConfirmation;
        assert!(converge(&mut day, &visit));
        assert!(day.entries.is_empty());
    }

    #[test]
    fn converge_drops_waiting_entry_for_another_date() {
        let mut day = QueueDay::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        let mut visit = appointment(AppointmentStatus::Confirmed, 9);
        let finished = appointment(AppointmentStatus::Completed, 8);
        converge(&mut day, &visit);
        day.entries.push(QueueEntry {
            status: QueueEntryStatus::Completed,
            ..QueueEntry::new(finished.id, finished.patient_id, finished.slot.start)
        });

        visit.date = NaiveDate::from_ymd_opt(2030, 1, 8).unwrap();
        assert!(converge(&mut day, &visit));
        assert!(day.entry(visit.id).is_none());

        let mut moved_finished = finished.clone();
        moved_finished.date = visit.date;
        assert!(!converge(&mut day, &moved_finished));
        assert!(day.entry(finished.id).is_some());
    }
}
