// libs/availability-cell/src/repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::time;

use crate::error::SlotError;
use crate::models::{carry_over_bookings, AvailabilityDay, DayLayout, DoctorSchedule, TimeSlot};

/// Storage for schedules and generated days. Implementations must make
/// `reserve_slot` a compare-and-set on `is_booked`.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn get_schedule(&self, doctor_id: Uuid) -> Result<Option<DoctorSchedule>, SlotError>;

    async fn save_schedule(&self, schedule: &DoctorSchedule) -> Result<DoctorSchedule, SlotError>;

    async fn get_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityDay>, SlotError>;

    /// Stores `day` unless one already exists for its (doctor, date) and
    /// returns whichever day ends up stored.
    async fn insert_day_if_absent(&self, day: AvailabilityDay)
        -> Result<AvailabilityDay, SlotError>;

    /// Regenerates the day from `layout`, carrying existing bookings over.
    async fn replace_day_layout(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        layout: DayLayout,
    ) -> Result<AvailabilityDay, SlotError>;

    async fn reserve_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        appointment_id: Uuid,
        patient_id: Uuid,
    ) -> Result<TimeSlot, SlotError>;

    async fn release_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<(), SlotError>;
}

#[derive(Default)]
pub struct InMemoryAvailabilityRepository {
    schedules: RwLock<HashMap<Uuid, DoctorSchedule>>,
    days: RwLock<HashMap<(Uuid, NaiveDate), AvailabilityDay>>,
}

impl InMemoryAvailabilityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryAvailabilityRepository {
    async fn get_schedule(&self, doctor_id: Uuid) -> Result<Option<DoctorSchedule>, SlotError> {
        Ok(self.schedules.read().await.get(&doctor_id).cloned())
    }

    async fn save_schedule(&self, schedule: &DoctorSchedule) -> Result<DoctorSchedule, SlotError> {
        self.schedules
            .write()
            .await
            .insert(schedule.doctor_id, schedule.clone());
        Ok(schedule.clone())
    }

    async fn get_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityDay>, SlotError> {
        Ok(self.days.read().await.get(&(doctor_id, date)).cloned())
    }

    async fn insert_day_if_absent(
        &self,
        day: AvailabilityDay,
    ) -> Result<AvailabilityDay, SlotError> {
        let mut days = self.days.write().await;
        let stored = days.entry((day.doctor_id, day.date)).or_insert(day);
        Ok(stored.clone())
    }

    async fn replace_day_layout(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        layout: DayLayout,
    ) -> Result<AvailabilityDay, SlotError> {
        let mut days = self.days.write().await;

        let regenerated = match days.get(&(doctor_id, date)) {
            Some(existing) => {
                let slots = carry_over_bookings(&existing.slots, layout.generate_slots())?;
                AvailabilityDay {
                    working_hours: layout.working_hours,
                    emergency_hours: layout.emergency_hours,
                    breaks: layout.breaks,
                    slot_duration_minutes: layout.slot_duration_minutes,
                    slots,
                    updated_at: Utc::now(),
                    ..existing.clone()
                }
            }
            None => AvailabilityDay::new(doctor_id, date, layout),
        };

        days.insert((doctor_id, date), regenerated.clone());
        Ok(regenerated)
    }

    async fn reserve_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        appointment_id: Uuid,
        patient_id: Uuid,
    ) -> Result<TimeSlot, SlotError> {
        let mut days = self.days.write().await;
        let day = days
            .get_mut(&(doctor_id, date))
            .ok_or_else(|| SlotError::DayNotFound {
                doctor_id,
                date: time::date_key(date),
            })?;

        let slot = day
            .slots
            .iter_mut()
            .find(|slot| slot.start == start)
            .ok_or_else(|| SlotError::SlotNotFound {
                date: time::date_key(date),
                start: time::format_hhmm(&start),
            })?;

        if slot.is_break {
            return Err(SlotError::BreakSlot {
                date: time::date_key(date),
                start: time::format_hhmm(&start),
            });
        }
        if slot.is_booked {
            return Err(SlotError::AlreadyBooked {
                date: time::date_key(date),
                start: time::format_hhmm(&start),
                appointment_id: slot.appointment_id,
            });
        }

        slot.is_booked = true;
        slot.appointment_id = Some(appointment_id);
        slot.patient_id = Some(patient_id);
        let reserved = slot.clone();
        day.updated_at = Utc::now();

        Ok(reserved)
    }

    async fn release_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<(), SlotError> {
        let mut days = self.days.write().await;
        if let Some(day) = days.get_mut(&(doctor_id, date)) {
            if let Some(slot) = day.slots.iter_mut().find(|slot| slot.start == start) {
                slot.is_booked = false;
                slot.appointment_id = None;
                slot.patient_id = None;
                day.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}
