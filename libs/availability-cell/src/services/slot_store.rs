// libs/availability-cell/src/services/slot_store.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_models::time;

use crate::error::SlotError;
use crate::models::{
    AvailabilityDay, ConfigureDayRequest, DayLayout, DoctorSchedule, ScheduleRequest, TimeSlot,
    TimeWindow, MAX_SLOT_DURATION_MINUTES, MIN_SLOT_DURATION_MINUTES,
};
use crate::repository::AvailabilityRepository;

/// Sole owner of slot mutation. Days are generated lazily from the doctor's
/// schedule and every reservation goes through the repository's compare-and-set.
pub struct SlotStore {
    repo: Arc<dyn AvailabilityRepository>,
    default_slot_duration: u32,
}

impl SlotStore {
    pub fn new(repo: Arc<dyn AvailabilityRepository>, default_slot_duration: u32) -> Self {
        Self {
            repo,
            default_slot_duration,
        }
    }

    pub async fn schedule_for(&self, doctor_id: Uuid) -> Result<DoctorSchedule, SlotError> {
        Ok(self
            .repo
            .get_schedule(doctor_id)
            .await?
            .unwrap_or_else(|| DoctorSchedule::clinic_default(doctor_id, self.default_slot_duration)))
    }

    #[instrument(skip(self))]
    pub async fn get_or_generate(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<AvailabilityDay, SlotError> {
        if let Some(day) = self.repo.get_day(doctor_id, date).await? {
            return Ok(day);
        }

        let schedule = self.schedule_for(doctor_id).await?;
        let day = AvailabilityDay::new(doctor_id, date, schedule.layout_for(date));
        debug!(
            "Generated {} slots for doctor {} on {}",
            day.slots.len(),
            doctor_id,
            day.date_key
        );

        self.repo.insert_day_if_absent(day).await
    }

    /// Read-only check used before booking. Returns the slot when it can be booked.
    pub async fn check_available(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<TimeSlot, SlotError> {
        let day = self.get_or_generate(doctor_id, date).await?;
        let slot = day.slot(start).ok_or_else(|| SlotError::SlotNotFound {
            date: day.date_key.clone(),
            start: time::format_hhmm(&start),
        })?;

        if slot.is_break {
            return Err(SlotError::BreakSlot {
                date: day.date_key.clone(),
                start: time::format_hhmm(&start),
            });
        }
        if slot.is_booked {
            return Err(SlotError::AlreadyBooked {
                date: day.date_key.clone(),
                start: time::format_hhmm(&start),
                appointment_id: slot.appointment_id,
            });
        }

        Ok(slot.clone())
    }

    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        appointment_id: Uuid,
        patient_id: Uuid,
    ) -> Result<TimeSlot, SlotError> {
        self.get_or_generate(doctor_id, date).await?;
        let slot = self
            .repo
            .reserve_slot(doctor_id, date, start, appointment_id, patient_id)
            .await?;

        info!(
            "Reserved slot {} on {} for appointment {}",
            time::format_hhmm(&start),
            time::date_key(date),
            appointment_id
        );
        Ok(slot)
    }

    /// Idempotent: clears the binding whatever its current value.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<(), SlotError> {
        self.repo.release_slot(doctor_id, date, start).await?;
        info!(
            "Released slot {} on {} for doctor {}",
            time::format_hhmm(&start),
            time::date_key(date),
            doctor_id
        );
        Ok(())
    }

    pub async fn configure_schedule(
        &self,
        doctor_id: Uuid,
        request: ScheduleRequest,
    ) -> Result<DoctorSchedule, SlotError> {
        let slot_duration_minutes = request
            .slot_duration_minutes
            .unwrap_or(self.default_slot_duration);
        let breaks = request.breaks.unwrap_or_default();

        validate_window(&request.working_hours, "working hours")?;
        validate_layout(&breaks, request.emergency_hours.as_ref(), slot_duration_minutes)?;
        if let Some(day) = request.working_days.iter().find(|day| **day > 6) {
            return Err(SlotError::ValidationError(format!(
                "Invalid weekday {}: expected 0 (Sunday) to 6 (Saturday)",
                day
            )));
        }

        let mut working_days = request.working_days;
        working_days.sort_unstable();
        working_days.dedup();

        let schedule = DoctorSchedule {
            doctor_id,
            working_days,
            working_hours: request.working_hours,
            breaks,
            emergency_hours: request.emergency_hours,
            slot_duration_minutes,
            updated_at: Utc::now(),
        };

        let saved = self.repo.save_schedule(&schedule).await?;
        info!("Schedule updated for doctor {}", doctor_id);
        Ok(saved)
    }

    /// Regenerates one day. Bookings are carried over; removing a booked slot is a conflict.
    #[instrument(skip(self, request))]
    pub async fn configure_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        request: ConfigureDayRequest,
    ) -> Result<AvailabilityDay, SlotError> {
        let schedule = self.schedule_for(doctor_id).await?;
        let layout = DayLayout {
            working_hours: request.working_hours,
            emergency_hours: request.emergency_hours,
            breaks: request.breaks.unwrap_or_default(),
            slot_duration_minutes: request
                .slot_duration_minutes
                .unwrap_or(schedule.slot_duration_minutes),
        };

        if let Some(hours) = layout.working_hours.as_ref() {
            validate_window(hours, "working hours")?;
        }
        validate_layout(
            &layout.breaks,
            layout.emergency_hours.as_ref(),
            layout.slot_duration_minutes,
        )?;

        let day = self.repo.replace_day_layout(doctor_id, date, layout).await?;
        info!(
            "Day {} reconfigured for doctor {} ({} slots)",
            day.date_key,
            doctor_id,
            day.slots.len()
        );
        Ok(day)
    }

    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, SlotError> {
        Ok(self.get_or_generate(doctor_id, date).await?.available_slots())
    }
}

fn validate_window(window: &TimeWindow, name: &str) -> Result<(), SlotError> {
    if !window.is_valid() {
        return Err(SlotError::ValidationError(format!(
            "Invalid {}: {} is not before {}",
            name,
            time::format_hhmm(&window.start),
            time::format_hhmm(&window.end)
        )));
    }
    Ok(())
}

fn validate_layout(
    breaks: &[TimeWindow],
    emergency_hours: Option<&TimeWindow>,
    slot_duration_minutes: u32,
) -> Result<(), SlotError> {
    if !(MIN_SLOT_DURATION_MINUTES..=MAX_SLOT_DURATION_MINUTES).contains(&slot_duration_minutes) {
        return Err(SlotError::ValidationError(format!(
            "Slot duration must be between {} and {} minutes",
            MIN_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES
        )));
    }
    for window in breaks {
        validate_window(window, "break")?;
    }
    if let Some(window) = emergency_hours {
        validate_window(window, "emergency hours")?;
    }
    Ok(())
}
