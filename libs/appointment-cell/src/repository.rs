// libs/appointment-cell/src/repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppointmentError;
use crate::models::{Appointment, AppointmentStatus};

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Writes `appointment` only if the stored status still equals `expected`.
    /// Writes `appointment` if the stored status is still `expected`. Never
    /// clears a stored `reminder_sent`.
    async fn update_if_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError>;

    async fn list_for_doctor_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Confirmed appointments on `dates` whose reminder has not been sent.
    async fn reminder_candidates(
        &self,
        dates: &[NaiveDate],
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Flips `reminder_sent` from false to true. Returns whether this call flipped it.
    async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        self.appointments
            .write()
            .await
            .insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn update_if_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let stored = appointments
            .get_mut(&appointment.id)
            .ok_or(AppointmentError::NotFound(appointment.id))?;

        if stored.status != expected {
            return Err(AppointmentError::StaleWrite {
                expected,
                current: stored.status,
            });
        }

        let reminder_sent = stored.reminder_sent;
        *stored = appointment.clone();
        stored.reminder_sent |= reminder_sent;
        Ok(stored.clone())
    }

    async fn list_for_doctor_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.date == date)
            .filter(|a| statuses.is_empty() || statuses.contains(&a.status))
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.slot.start);
        Ok(matching)
    }

    async fn reminder_candidates(
        &self,
        dates: &[NaiveDate],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .values()
            .filter(|a| {
                a.status == AppointmentStatus::Confirmed
                    && !a.reminder_sent
                    && dates.contains(&a.date)
            })
            .cloned()
            .collect())
    }

    async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let stored = appointments
            .get_mut(&id)
            .ok_or(AppointmentError::NotFound(id))?;

        if stored.reminder_sent {
            return Ok(false);
        }
        stored.reminder_sent = true;
        stored.updated_at = Utc::now();
        Ok(true)
    }
}
