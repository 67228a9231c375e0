// libs/availability-cell/src/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::{
    SupabaseClient, IGNORE_DUPLICATES, MERGE_DUPLICATES, RETURN_REPRESENTATION,
};
use shared_models::time::{self, hhmm};

use crate::error::SlotError;
use crate::models::{
    carry_over_bookings, AvailabilityDay, DayLayout, DoctorSchedule, SlotKind, TimeSlot,
    TimeWindow,
};
use crate::repository::AvailabilityRepository;

/// Row of `availability_days`. Unique on (doctor_id, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DayRow {
    id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    date_key: String,
    working_hours: Option<TimeWindow>,
    emergency_hours: Option<TimeWindow>,
    breaks: Vec<TimeWindow>,
    slot_duration_minutes: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row of `time_slots`. Unique on (doctor_id, date, start_time).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotRow {
    day_id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    #[serde(with = "hhmm")]
    start_time: NaiveTime,
    #[serde(with = "hhmm")]
    end_time: NaiveTime,
    is_booked: bool,
    is_break: bool,
    kind: SlotKind,
    appointment_id: Option<Uuid>,
    patient_id: Option<Uuid>,
}

impl SlotRow {
    fn from_slot(day: &AvailabilityDay, slot: &TimeSlot) -> Self {
        Self {
            day_id: day.id,
            doctor_id: day.doctor_id,
            date: day.date,
            start_time: slot.start,
            end_time: slot.end,
            is_booked: slot.is_booked,
            is_break: slot.is_break,
            kind: slot.kind,
            appointment_id: slot.appointment_id,
            patient_id: slot.patient_id,
        }
    }

    fn into_slot(self) -> TimeSlot {
        TimeSlot {
            start: self.start_time,
            end: self.end_time,
            is_booked: self.is_booked,
            is_break: self.is_break,
            kind: self.kind,
            appointment_id: self.appointment_id,
            patient_id: self.patient_id,
        }
    }
}

impl DayRow {
    fn from_day(day: &AvailabilityDay) -> Self {
        Self {
            id: day.id,
            doctor_id: day.doctor_id,
            date: day.date,
            date_key: day.date_key.clone(),
            working_hours: day.working_hours,
            emergency_hours: day.emergency_hours,
            breaks: day.breaks.clone(),
            slot_duration_minutes: day.slot_duration_minutes,
            created_at: day.created_at,
            updated_at: day.updated_at,
        }
    }

    fn into_day(self, slots: Vec<TimeSlot>) -> AvailabilityDay {
        AvailabilityDay {
            id: self.id,
            doctor_id: self.doctor_id,
            date: self.date,
            date_key: self.date_key,
            working_hours: self.working_hours,
            emergency_hours: self.emergency_hours,
            breaks: self.breaks,
            slot_duration_minutes: self.slot_duration_minutes,
            slots,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn persistence(e: impl std::fmt::Display) -> SlotError {
    SlotError::Persistence(e.to_string())
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, SlotError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(persistence))
        .collect()
}

/// PostgREST-backed store over `doctor_schedules`, `availability_days` and `time_slots`.
pub struct SupabaseAvailabilityRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAvailabilityRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn slot_filter(doctor_id: Uuid, date: NaiveDate, start: NaiveTime) -> String {
        format!(
            "doctor_id=eq.{}&date=eq.{}&start_time=eq.{}",
            doctor_id,
            time::date_key(date),
            start.format("%H:%M:%S")
        )
    }

    async fn fetch_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, SlotError> {
        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&date=eq.{}&order=start_time.asc",
            doctor_id,
            time::date_key(date)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Ok(parse_rows::<SlotRow>(rows)?
            .into_iter()
            .map(SlotRow::into_slot)
            .collect())
    }

    async fn fetch_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<Option<TimeSlot>, SlotError> {
        let path = format!("/rest/v1/time_slots?{}", Self::slot_filter(doctor_id, date, start));
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Ok(parse_rows::<SlotRow>(rows)?
            .into_iter()
            .next()
            .map(SlotRow::into_slot))
    }

    async fn insert_slots(&self, day: &AvailabilityDay, slots: &[TimeSlot]) -> Result<(), SlotError> {
        if slots.is_empty() {
            return Ok(());
        }

        let rows: Vec<SlotRow> = slots.iter().map(|slot| SlotRow::from_slot(day, slot)).collect();
        let body = serde_json::to_value(rows).map_err(persistence)?;

        let _: Vec<Value> = self
            .supabase
            .request_preferring(
                Method::POST,
                "/rest/v1/time_slots?on_conflict=doctor_id,date,start_time",
                Some(body),
                IGNORE_DUPLICATES,
            )
            .await
            .map_err(persistence)?;

        Ok(())
    }
}

#[async_trait]
impl AvailabilityRepository for SupabaseAvailabilityRepository {
    async fn get_schedule(&self, doctor_id: Uuid) -> Result<Option<DoctorSchedule>, SlotError> {
        let path = format!("/rest/v1/doctor_schedules?doctor_id=eq.{}", doctor_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Ok(parse_rows::<DoctorSchedule>(rows)?.into_iter().next())
    }

    async fn save_schedule(&self, schedule: &DoctorSchedule) -> Result<DoctorSchedule, SlotError> {
        let body = serde_json::to_value(schedule).map_err(persistence)?;
        let rows: Vec<Value> = self
            .supabase
            .request_preferring(
                Method::POST,
                "/rest/v1/doctor_schedules?on_conflict=doctor_id",
                Some(body),
                MERGE_DUPLICATES,
            )
            .await
            .map_err(persistence)?;

        Ok(parse_rows::<DoctorSchedule>(rows)?
            .into_iter()
            .next()
            .unwrap_or_else(|| schedule.clone()))
    }

    async fn get_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityDay>, SlotError> {
        let path = format!(
            "/rest/v1/availability_days?doctor_id=eq.{}&date=eq.{}",
            doctor_id,
            time::date_key(date)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        let Some(row) = parse_rows::<DayRow>(rows)?.into_iter().next() else {
            return Ok(None);
        };

        let slots = self.fetch_slots(doctor_id, date).await?;
        Ok(Some(row.into_day(slots)))
    }

    async fn insert_day_if_absent(
        &self,
        day: AvailabilityDay,
    ) -> Result<AvailabilityDay, SlotError> {
        let body = serde_json::to_value(DayRow::from_day(&day)).map_err(persistence)?;
        let inserted: Vec<Value> = self
            .supabase
            .request_preferring(
                Method::POST,
                "/rest/v1/availability_days?on_conflict=doctor_id,date",
                Some(body),
                IGNORE_DUPLICATES,
            )
            .await
            .map_err(persistence)?;

        if inserted.is_empty() {
            debug!(
                "Availability day for doctor {} on {} already exists",
                day.doctor_id, day.date_key
            );
        } else {
            self.insert_slots(&day, &day.slots).await?;
        }

        self.get_day(day.doctor_id, day.date)
            .await?
            .ok_or_else(|| SlotError::DayNotFound {
                doctor_id: day.doctor_id,
                date: day.date_key.clone(),
            })
    }

    async fn replace_day_layout(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        layout: DayLayout,
    ) -> Result<AvailabilityDay, SlotError> {
        let Some(existing) = self.get_day(doctor_id, date).await? else {
            return self
                .insert_day_if_absent(AvailabilityDay::new(doctor_id, date, layout))
                .await;
        };

        let slots = carry_over_bookings(&existing.slots, layout.generate_slots())?;
        let updated = AvailabilityDay {
            working_hours: layout.working_hours,
            emergency_hours: layout.emergency_hours,
            breaks: layout.breaks,
            slot_duration_minutes: layout.slot_duration_minutes,
            slots,
            updated_at: Utc::now(),
            ..existing
        };

        let day_path = format!("/rest/v1/availability_days?id=eq.{}", updated.id);
        let body = serde_json::to_value(DayRow::from_day(&updated)).map_err(persistence)?;
        let _: Vec<Value> = self
            .supabase
            .request_preferring(Method::PATCH, &day_path, Some(body), RETURN_REPRESENTATION)
            .await
            .map_err(persistence)?;

        // Booked rows stay in place; only free rows are replaced.
        let delete_path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&date=eq.{}&is_booked=eq.false",
            doctor_id,
            time::date_key(date)
        );
        let _: Vec<Value> = self
            .supabase
            .request_preferring(Method::DELETE, &delete_path, None, RETURN_REPRESENTATION)
            .await
            .map_err(persistence)?;

        let free: Vec<TimeSlot> = updated.slots.iter().filter(|s| !s.is_booked).cloned().collect();
        self.insert_slots(&updated, &free).await?;

        self.get_day(doctor_id, date)
            .await?
            .ok_or_else(|| SlotError::DayNotFound {
                doctor_id,
                date: time::date_key(date),
            })
    }

    async fn reserve_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        appointment_id: Uuid,
        patient_id: Uuid,
    ) -> Result<TimeSlot, SlotError> {
        let path = format!(
            "/rest/v1/time_slots?{}&is_booked=eq.false&is_break=eq.false",
            Self::slot_filter(doctor_id, date, start)
        );
        let body = json!({
            "is_booked": true,
            "appointment_id": appointment_id,
            "patient_id": patient_id,
        });

        let rows: Vec<Value> = self
            .supabase
            .request_preferring(Method::PATCH, &path, Some(body), RETURN_REPRESENTATION)
            .await
            .map_err(persistence)?;

        if let Some(row) = parse_rows::<SlotRow>(rows)?.into_iter().next() {
            return Ok(row.into_slot());
        }

        // Nothing matched the guarded update: find out why.
        let date_key = time::date_key(date);
        let start_key = time::format_hhmm(&start);
        match self.fetch_slot(doctor_id, date, start).await? {
            None => Err(SlotError::SlotNotFound {
                date: date_key,
                start: start_key,
            }),
            Some(slot) if slot.is_break => Err(SlotError::BreakSlot {
                date: date_key,
                start: start_key,
            }),
            Some(slot) => {
                warn!(
                    "Slot {} on {} for doctor {} lost reservation race",
                    start_key, date_key, doctor_id
                );
                Err(SlotError::AlreadyBooked {
                    date: date_key,
                    start: start_key,
                    appointment_id: slot.appointment_id,
                })
            }
        }
    }

    async fn release_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<(), SlotError> {
        let path = format!("/rest/v1/time_slots?{}", Self::slot_filter(doctor_id, date, start));
        let body = json!({
            "is_booked": false,
            "appointment_id": null,
            "patient_id": null,
        });

        let _: Vec<Value> = self
            .supabase
            .request_preferring(Method::PATCH, &path, Some(body), RETURN_REPRESENTATION)
            .await
            .map_err(persistence)?;

        Ok(())
    }
}
