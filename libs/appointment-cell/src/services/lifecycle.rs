// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use availability_cell::{SlotError, SlotStore, TimeWindow};
use shared_config::AppConfig;
use shared_models::auth::{Actor, ActorRole};
use shared_models::time;
use shared_utils::KeyedLocks;

use crate::error::AppointmentError;
use crate::models::{
    Appointment, AppointmentEvent, AppointmentStatus, BookAppointmentRequest, PaymentStatus,
    RescheduleRequest, StatusHistoryEntry,
};
use crate::repository::AppointmentRepository;
use crate::services::events::EventBus;

type SlotKey = (Uuid, NaiveDate, NaiveTime);

fn slot_key(appointment: &Appointment) -> SlotKey {
    (appointment.doctor_id, appointment.date, appointment.slot.start)
}

/// What the slot step of a transition did, so it can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStep {
    Untouched,
    Reserved,
    Released,
}

/// Owns appointment state. Every status change runs the slot step and the
/// conditional appointment write under the slot's lock, undoing the slot step
/// if the write fails.
pub struct AppointmentLifecycle {
    repo: Arc<dyn AppointmentRepository>,
    slots: Arc<SlotStore>,
    events: EventBus,
    slot_locks: KeyedLocks<SlotKey>,
    clinic_offset: FixedOffset,
}

impl AppointmentLifecycle {
    pub fn new(
        repo: Arc<dyn AppointmentRepository>,
        slots: Arc<SlotStore>,
        events: EventBus,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            slots,
            events,
            slot_locks: KeyedLocks::new(),
            clinic_offset: time::clinic_offset(config.clinic_utc_offset_minutes),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn clinic_today(&self) -> NaiveDate {
        time::clinic_local(self.clinic_offset, Utc::now()).date()
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, date = %request.date))]
    pub async fn book(
        &self,
        request: BookAppointmentRequest,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = match (request.patient_id, actor.role) {
            (Some(patient_id), _) => patient_id,
            (None, ActorRole::Patient) => actor.user_id,
            (None, _) => {
                return Err(AppointmentError::ValidationError(
                    "patient_id is required".to_string(),
                ))
            }
        };

        match actor.role {
            ActorRole::Patient if patient_id != actor.user_id => {
                return Err(AppointmentError::Forbidden(
                    "Patients can only book for themselves".to_string(),
                ));
            }
            ActorRole::Doctor if request.doctor_id != actor.user_id => {
                return Err(AppointmentError::Forbidden(
                    "Doctors can only book into their own schedule".to_string(),
                ));
            }
            _ => {}
        }

        if request.doctor_id.is_nil() || patient_id.is_nil() {
            return Err(AppointmentError::ValidationError(
                "doctor_id and patient_id are required".to_string(),
            ));
        }
        if request.symptoms.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "symptoms are required".to_string(),
            ));
        }
        self.validate_target(request.date, &request.slot)?;

        let slot_minutes = time::minutes_since_midnight(&request.slot.end)
            - time::minutes_since_midnight(&request.slot.start);
        let duration_minutes = request.duration_minutes.unwrap_or(slot_minutes);
        if duration_minutes == 0 {
            return Err(AppointmentError::ValidationError(
                "duration_minutes must be positive".to_string(),
            ));
        }

        self.ensure_bookable(request.doctor_id, request.date, &request.slot)
            .await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            patient_id,
            date: request.date,
            date_key: time::date_key(request.date),
            slot: request.slot,
            kind: request.kind.unwrap_or_default(),
            consultation_mode: request.consultation_mode,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            duration_minutes,
            symptoms: request.symptoms.trim().to_string(),
            reminder_sent: false,
            status_history: vec![StatusHistoryEntry::new(AppointmentStatus::Pending, actor, None)],
            created_at: now,
            updated_at: now,
        };

        let saved = self.repo.insert(&appointment).await?;
        info!(
            "Appointment {} booked for patient {} with doctor {} at {} {}",
            saved.id,
            saved.patient_id,
            saved.doctor_id,
            saved.date_key,
            time::format_hhmm(&saved.slot.start)
        );

        self.publish(&saved, None, None, actor);
        Ok(saved)
    }

    fn validate_target(&self, date: NaiveDate, slot: &TimeWindow) -> Result<(), AppointmentError> {
        if !slot.is_valid() {
            return Err(AppointmentError::ValidationError(format!(
                "Slot end {} must be after start {}",
                time::format_hhmm(&slot.end),
                time::format_hhmm(&slot.start)
            )));
        }
        if date < self.clinic_today() {
            return Err(AppointmentError::ValidationError(format!(
                "Date {} is in the past",
                time::date_key(date)
            )));
        }
        Ok(())
    }

    /// The slot must exist in the doctor's day, match exactly, and be free.
    async fn ensure_bookable(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot: &TimeWindow,
    ) -> Result<(), AppointmentError> {
        let available = self
            .slots
            .check_available(doctor_id, date, slot.start)
            .await
            .map_err(|e| match e {
                SlotError::SlotNotFound { .. }
                | SlotError::DayNotFound { .. }
                | SlotError::BreakSlot { .. } => AppointmentError::ValidationError(e.to_string()),
                other => AppointmentError::Slot(other),
            })?;

        if available.end != slot.end {
            return Err(AppointmentError::ValidationError(format!(
                "Slot {} ends at {}",
                time::format_hhmm(&available.start),
                time::format_hhmm(&available.end)
            )));
        }
        Ok(())
    }

    // ==========================================================================
    // STATE MACHINE
    // ==========================================================================

    #[instrument(skip(self, notes), fields(actor = %actor.user_id, role = %actor.role))]
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let snapshot = self.load(appointment_id).await?;
        let _guard = self.slot_locks.lock(slot_key(&snapshot)).await;

        let current = self.load(appointment_id).await?;
        if slot_key(&current) != slot_key(&snapshot) {
            return Err(AppointmentError::StaleWrite {
                expected: snapshot.status,
                current: current.status,
            });
        }

        authorize_transition(&current, new_status, actor)?;

        if !current.status.can_transition_to(new_status) {
            info!(
                "Rejected transition of {} from {} to {}",
                appointment_id, current.status, new_status
            );
            return Err(AppointmentError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let old_status = current.status;
        let step = self.apply_slot_step(&current, new_status).await?;

        let mut updated = current.clone();
        updated.status = new_status;
        updated
            .status_history
            .push(StatusHistoryEntry::new(new_status, actor, notes));
        updated.updated_at = Utc::now();

        let saved = match self.repo.update_if_status(&updated, old_status).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(
                    "Write of {} -> {} for {} failed, undoing slot step: {}",
                    old_status, new_status, appointment_id, e
                );
                self.compensate(&current, step).await;
                return Err(e);
            }
        };

        info!(
            "Appointment {} moved {} -> {} by {} {}",
            appointment_id, old_status, new_status, actor.role, actor.user_id
        );
        self.publish(&saved, Some(old_status), None, actor);
        Ok(saved)
    }

    async fn apply_slot_step(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
    ) -> Result<SlotStep, AppointmentError> {
        let old_status = appointment.status;

        if !old_status.holds_slot() && new_status.holds_slot() {
            self.slots
                .reserve(
                    appointment.doctor_id,
                    appointment.date,
                    appointment.slot.start,
                    appointment.id,
                    appointment.patient_id,
                )
                .await?;
            return Ok(SlotStep::Reserved);
        }

        if old_status.holds_slot() && new_status.frees_slot() {
            self.slots
                .release(appointment.doctor_id, appointment.date, appointment.slot.start)
                .await?;
            return Ok(SlotStep::Released);
        }

        Ok(SlotStep::Untouched)
    }

    async fn compensate(&self, appointment: &Appointment, step: SlotStep) {
        let result = match step {
            SlotStep::Untouched => return,
            SlotStep::Reserved => {
                self.slots
                    .release(appointment.doctor_id, appointment.date, appointment.slot.start)
                    .await
            }
            SlotStep::Released => self
                .slots
                .reserve(
                    appointment.doctor_id,
                    appointment.date,
                    appointment.slot.start,
                    appointment.id,
                    appointment.patient_id,
                )
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => debug!("Slot step {:?} undone for {}", step, appointment.id),
            Err(e) => error!(
                "Failed to undo slot step {:?} for appointment {}: {}",
                step, appointment.id, e
            ),
        }
    }

    #[instrument(skip(self, request), fields(actor = %actor.user_id))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleRequest,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        self.validate_target(request.date, &request.slot)?;

        let snapshot = self.load(appointment_id).await?;
        let old_key = slot_key(&snapshot);
        let new_key = (snapshot.doctor_id, request.date, request.slot.start);
        let _guards = self.slot_locks.lock_many(vec![old_key, new_key]).await;

        let current = self.load(appointment_id).await?;
        if slot_key(&current) != old_key {
            return Err(AppointmentError::StaleWrite {
                expected: snapshot.status,
                current: current.status,
            });
        }
        if !current.is_participant(actor) {
            return Err(AppointmentError::Forbidden(format!(
                "{} {} is not a participant of appointment {}",
                actor.role, actor.user_id, appointment_id
            )));
        }

        let target = if request.requires_confirmation {
            AppointmentStatus::PendingPatientConfirmation
        } else {
            AppointmentStatus::Confirmed
        };
        if !current.status.can_reschedule() {
            return Err(AppointmentError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        let same_slot = new_key == old_key;
        let held = current.status.holds_slot();

        let reserved_new = if same_slot {
            if !held {
                self.reserve_for(&current, request.date, request.slot.start)
                    .await?;
            }
            !held
        } else {
            self.ensure_bookable(current.doctor_id, request.date, &request.slot)
                .await?;
            self.reserve_for(&current, request.date, request.slot.start)
                .await?;
            true
        };

        let old_status = current.status;
        let move_note = format!(
            "Rescheduled from {} {} to {} {}",
            current.date_key,
            time::format_hhmm(&current.slot.start),
            time::date_key(request.date),
            time::format_hhmm(&request.slot.start)
        );
        let notes = match request.notes {
            Some(extra) if !extra.trim().is_empty() => format!("{}: {}", move_note, extra.trim()),
            _ => move_note,
        };

        let mut updated = current.clone();
        updated.date = request.date;
        updated.date_key = time::date_key(request.date);
        updated.slot = request.slot;
        updated.status = target;
        updated
            .status_history
            .push(StatusHistoryEntry::new(target, actor, Some(notes)));
        updated.updated_at = Utc::now();

        let saved = match self.repo.update_if_status(&updated, old_status).await {
            Ok(saved) => saved,
            Err(e) => {
                if reserved_new {
                    if let Err(release_err) = self
                        .slots
                        .release(current.doctor_id, request.date, request.slot.start)
                        .await
                    {
                        error!(
                            "Failed to release new slot after failed reschedule of {}: {}",
                            appointment_id, release_err
                        );
                    }
                }
                return Err(e);
            }
        };

        if !same_slot && held {
            if let Err(e) = self
                .slots
                .release(current.doctor_id, current.date, current.slot.start)
                .await
            {
                error!(
                    "Appointment {} rescheduled but old slot {} {} was not released: {}",
                    appointment_id,
                    current.date_key,
                    time::format_hhmm(&current.slot.start),
                    e
                );
            }
        }

        info!("Appointment {} rescheduled to {} {}", appointment_id, saved.date_key, time::format_hhmm(&saved.slot.start));
        let previous_date = (current.date != saved.date).then_some(current.date);
        self.publish(&saved, Some(old_status), previous_date, actor);
        Ok(saved)
    }

    async fn reserve_for(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<(), AppointmentError> {
        self.slots
            .reserve(
                appointment.doctor_id,
                date,
                start,
                appointment.id,
                appointment.patient_id,
            )
            .await?;
        Ok(())
    }

    // ==========================================================================
    // READ PATHS
    // ==========================================================================

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.repo
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    pub async fn get(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !appointment.is_participant(actor) {
            return Err(AppointmentError::Forbidden(format!(
                "{} {} cannot view appointment {}",
                actor.role, actor.user_id, appointment_id
            )));
        }
        Ok(appointment)
    }

    /// Unauthenticated read used by in-process collaborators.
    pub async fn find(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        self.repo.get(appointment_id).await
    }

    pub async fn list_for_doctor_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.repo.list_for_doctor_day(doctor_id, date, statuses).await
    }

    pub async fn reminder_candidates(
        &self,
        dates: &[NaiveDate],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.repo.reminder_candidates(dates).await
    }

    pub async fn mark_reminder_sent(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let flipped = self.repo.mark_reminder_sent(appointment_id).await?;
        if flipped {
            debug!("Reminder flag set for appointment {}", appointment_id);
        }
        Ok(flipped)
    }

    fn publish(
        &self,
        appointment: &Appointment,
        old_status: Option<AppointmentStatus>,
        previous_date: Option<NaiveDate>,
        actor: &Actor,
    ) {
        self.events.publish(AppointmentEvent {
            appointment: appointment.clone(),
            old_status,
            new_status: appointment.status,
            previous_date,
            actor: *actor,
            occurred_at: Utc::now(),
        });
    }
}

/// Participants act on their own appointments. Patients may cancel, or answer
/// a pending confirmation; doctors may do anything but that answer.
fn authorize_transition(
    appointment: &Appointment,
    to: AppointmentStatus,
    actor: &Actor,
) -> Result<(), AppointmentError> {
    if !appointment.is_participant(actor) {
        return Err(AppointmentError::Forbidden(format!(
            "{} {} is not a participant of appointment {}",
            actor.role, actor.user_id, appointment.id
        )));
    }

    let awaiting_patient = appointment.status == AppointmentStatus::PendingPatientConfirmation;
    let allowed = match actor.role {
        ActorRole::Admin | ActorRole::System => true,
        ActorRole::Patient => {
            to == AppointmentStatus::Cancelled
                || (awaiting_patient
                    && matches!(to, AppointmentStatus::Confirmed | AppointmentStatus::Rejected))
        }
        ActorRole::Doctor => !(awaiting_patient && to == AppointmentStatus::Confirmed),
    };

    if !allowed {
        return Err(AppointmentError::Forbidden(format!(
            "{} cannot move appointment from {} to {}",
            actor.role, appointment.status, to
        )));
    }
    Ok(())
}
