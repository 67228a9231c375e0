// libs/availability-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::time::{self, hhmm};

use crate::error::SlotError;

// ==============================================================================
// TIME WINDOWS AND SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Half-open overlap: `[start, end)` against `[other_start, other_end)`.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    #[default]
    Regular,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub is_booked: bool,
    pub is_break: bool,
    pub kind: SlotKind,
    pub appointment_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

impl TimeSlot {
    pub fn free(start: NaiveTime, end: NaiveTime, kind: SlotKind) -> Self {
        Self {
            start,
            end,
            is_booked: false,
            is_break: false,
            kind,
            appointment_id: None,
            patient_id: None,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.is_booked && !self.is_break
    }
}

// ==============================================================================
// AVAILABILITY DAY
// ==============================================================================

/// The generated slot layout of one doctor on one calendar day. Unique per (doctor, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub date_key: String,
    pub working_hours: Option<TimeWindow>,
    pub emergency_hours: Option<TimeWindow>,
    pub breaks: Vec<TimeWindow>,
    pub slot_duration_minutes: u32,
    pub slots: Vec<TimeSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityDay {
    pub fn new(doctor_id: Uuid, date: NaiveDate, layout: DayLayout) -> Self {
        let now = Utc::now();
        let slots = layout.generate_slots();
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            date,
            date_key: time::date_key(date),
            working_hours: layout.working_hours,
            emergency_hours: layout.emergency_hours,
            breaks: layout.breaks,
            slot_duration_minutes: layout.slot_duration_minutes,
            slots,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self, start: NaiveTime) -> Option<&TimeSlot> {
        self.slots.iter().find(|slot| slot.start == start)
    }

    pub fn available_slots(&self) -> Vec<TimeSlot> {
        self.slots.iter().filter(|slot| slot.is_available()).cloned().collect()
    }
}

/// Inputs from which a day's slots are derived.
#[derive(Debug, Clone)]
pub struct DayLayout {
    pub working_hours: Option<TimeWindow>,
    pub emergency_hours: Option<TimeWindow>,
    pub breaks: Vec<TimeWindow>,
    pub slot_duration_minutes: u32,
}

impl DayLayout {
    /// Regular slots across working hours, emergency slots across emergency hours
    /// (skipping starts already covered), and break-overlapping slots flagged `is_break`.
    pub fn generate_slots(&self) -> Vec<TimeSlot> {
        let mut slots = Vec::new();

        if let Some(window) = self.working_hours {
            slots.extend(self.slots_for_window(window, SlotKind::Regular));
        }

        if let Some(window) = self.emergency_hours {
            for slot in self.slots_for_window(window, SlotKind::Emergency) {
                if !slots.iter().any(|existing: &TimeSlot| existing.start == slot.start) {
                    slots.push(slot);
                }
            }
        }

        slots.sort_by_key(|slot| slot.start);
        slots
    }

    fn slots_for_window(&self, window: TimeWindow, kind: SlotKind) -> Vec<TimeSlot> {
        let mut slots = Vec::new();
        if self.slot_duration_minutes == 0 || !window.is_valid() {
            return slots;
        }

        let end = time::minutes_since_midnight(&window.end);
        let mut cursor = time::minutes_since_midnight(&window.start);

        while cursor + self.slot_duration_minutes <= end {
            let (Some(start), Some(slot_end)) = (
                time::time_from_minutes(cursor),
                time::time_from_minutes(cursor + self.slot_duration_minutes),
            ) else {
                break;
            };

            let mut slot = TimeSlot::free(start, slot_end, kind);
            slot.is_break = self.breaks.iter().any(|b| b.overlaps(start, slot_end));
            slots.push(slot);

            cursor += self.slot_duration_minutes;
        }

        slots
    }
}

/// Carries the bookings of `existing` over into a regenerated `layout`. Fails if a
/// booked slot has no bookable counterpart with the same start and end.
pub fn carry_over_bookings(
    existing: &[TimeSlot],
    mut layout: Vec<TimeSlot>,
) -> Result<Vec<TimeSlot>, SlotError> {
    for booked in existing.iter().filter(|slot| slot.is_booked) {
        let target = layout
            .iter_mut()
            .find(|slot| slot.start == booked.start && slot.end == booked.end && !slot.is_break)
            .ok_or_else(|| {
                SlotError::Conflict(format!(
                    "Slot {} is booked and would be removed by the new layout",
                    time::format_hhmm(&booked.start)
                ))
            })?;

        target.is_booked = true;
        target.appointment_id = booked.appointment_id;
        target.patient_id = booked.patient_id;
    }

    Ok(layout)
}

// ==============================================================================
// DOCTOR SCHEDULE
// ==============================================================================

/// A doctor's regular weekly configuration. Weekdays use 0 = Sunday ... 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub doctor_id: Uuid,
    pub working_days: Vec<u32>,
    pub working_hours: TimeWindow,
    pub breaks: Vec<TimeWindow>,
    pub emergency_hours: Option<TimeWindow>,
    pub slot_duration_minutes: u32,
    pub updated_at: DateTime<Utc>,
}

impl DoctorSchedule {
    /// Monday to Friday, 09:00 to 17:00, no breaks.
    pub fn clinic_default(doctor_id: Uuid, slot_duration_minutes: u32) -> Self {
        Self {
            doctor_id,
            working_days: vec![1, 2, 3, 4, 5],
            working_hours: TimeWindow::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
                NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            ),
            breaks: Vec::new(),
            emergency_hours: None,
            slot_duration_minutes,
            updated_at: Utc::now(),
        }
    }

    pub fn works_on(&self, date: NaiveDate) -> bool {
        self.working_days
            .contains(&date.weekday().num_days_from_sunday())
    }

    pub fn layout_for(&self, date: NaiveDate) -> DayLayout {
        DayLayout {
            working_hours: self.works_on(date).then_some(self.working_hours),
            emergency_hours: self.emergency_hours,
            breaks: self.breaks.clone(),
            slot_duration_minutes: self.slot_duration_minutes,
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub working_days: Vec<u32>,
    pub working_hours: TimeWindow,
    pub breaks: Option<Vec<TimeWindow>>,
    pub emergency_hours: Option<TimeWindow>,
    pub slot_duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureDayRequest {
    /// `None` marks the day off for regular visits.
    pub working_hours: Option<TimeWindow>,
    pub breaks: Option<Vec<TimeWindow>>,
    pub emergency_hours: Option<TimeWindow>,
    pub slot_duration_minutes: Option<u32>,
}

pub const MIN_SLOT_DURATION_MINUTES: u32 = 5;
pub const MAX_SLOT_DURATION_MINUTES: u32 = 240;
