// libs/queue-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::{AppointmentStatus, ConsultationMode};
use shared_models::time::{self, hhmm, hhmm_option};

pub const DEFAULT_AVERAGE_CONSULTATION_MINUTES: u32 = 15;
pub const MAX_DELAY_MINUTES: u32 = 480;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl QueueEntryStatus {
    /// Position along the visit; entries only ever move to a higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            QueueEntryStatus::Waiting => 0,
            QueueEntryStatus::InProgress => 1,
            QueueEntryStatus::Completed | QueueEntryStatus::Cancelled | QueueEntryStatus::NoShow => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    pub fn can_transition_to(&self, next: QueueEntryStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Queue status an appointment status converges to. Appointments that have
    /// not been confirmed yet have no queue presence.
    pub fn from_appointment(status: AppointmentStatus) -> Option<Self> {
        match status {
            AppointmentStatus::Pending | AppointmentStatus::PendingPatientConfirmation => None,
            AppointmentStatus::Confirmed => Some(QueueEntryStatus::Waiting),
            AppointmentStatus::InProgress => Some(QueueEntryStatus::InProgress),
            AppointmentStatus::Completed => Some(QueueEntryStatus::Completed),
            AppointmentStatus::Cancelled | AppointmentStatus::Rejected => {
                Some(QueueEntryStatus::Cancelled)
            }
            AppointmentStatus::NoShow => Some(QueueEntryStatus::NoShow),
        }
    }
}

impl std::fmt::Display for QueueEntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueEntryStatus::Waiting => write!(f, "waiting"),
            QueueEntryStatus::InProgress => write!(f, "in_progress"),
            QueueEntryStatus::Completed => write!(f, "completed"),
            QueueEntryStatus::Cancelled => write!(f, "cancelled"),
            QueueEntryStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    #[serde(with = "hhmm")]
    pub scheduled_time: NaiveTime,
    pub consultation_type: ConsultationMode,
    pub status: QueueEntryStatus,
    /// Higher is seen sooner.
    pub priority: i32,
    pub check_in_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_wait_time: Option<u32>,
    pub notes: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(appointment_id: Uuid, patient_id: Uuid, scheduled_time: NaiveTime) -> Self {
        Self {
            appointment_id,
            patient_id,
            scheduled_time,
            consultation_type: ConsultationMode::InPerson,
            status: QueueEntryStatus::Waiting,
            priority: 0,
            check_in_time: None,
            start_time: None,
            end_time: None,
            estimated_wait_time: None,
            notes: None,
            last_updated: Utc::now(),
        }
    }
}

/// Live order of one doctor's day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDay {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub date_key: String,
    pub entries: Vec<QueueEntry>,
    pub current_delay: u32,
    pub average_consultation_time: u32,
    pub last_updated: DateTime<Utc>,
}

impl QueueDay {
    pub fn new(doctor_id: Uuid, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            date,
            date_key: time::date_key(date),
            entries: Vec::new(),
            current_delay: 0,
            average_consultation_time: DEFAULT_AVERAGE_CONSULTATION_MINUTES,
            last_updated: Utc::now(),
        }
    }

    pub fn current_entry(&self) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|entry| entry.status == QueueEntryStatus::InProgress)
    }

    pub fn entry(&self, appointment_id: Uuid) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|entry| entry.appointment_id == appointment_id)
    }

    pub fn entry_mut(&mut self, appointment_id: Uuid) -> Option<&mut QueueEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.appointment_id == appointment_id)
    }

    pub fn waiting_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == QueueEntryStatus::Waiting)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue: QueueDay,
    pub current_entry: Option<QueueEntry>,
    pub waiting_count: usize,
}

impl From<QueueDay> for QueueStatus {
    fn from(queue: QueueDay) -> Self {
        Self {
            current_entry: queue.current_entry().cloned(),
            waiting_count: queue.waiting_count(),
            queue,
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Fields to insert or merge. `patient_id` and `scheduled_time` are required
/// when the entry does not exist yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertEntryRequest {
    pub appointment_id: Uuid,
    pub patient_id: Option<Uuid>,
    #[serde(default, with = "hhmm_option")]
    pub scheduled_time: Option<NaiveTime>,
    pub consultation_type: Option<ConsultationMode>,
    pub priority: Option<i32>,
    #[serde(default)]
    pub checked_in: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntryStatusRequest {
    pub status: QueueEntryStatus,
    pub priority: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDelayRequest {
    pub minutes: u32,
}
