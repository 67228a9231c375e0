// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use availability_cell::TimeWindow;
use shared_models::auth::{Actor, ActorRole};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub date_key: String,
    pub slot: TimeWindow,
    pub kind: AppointmentKind,
    pub consultation_mode: ConsultationMode,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub duration_minutes: u32,
    pub symptoms: String,
    pub reminder_sent: bool,
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Clinic-local start of the visit.
    pub fn local_start(&self) -> NaiveDateTime {
        self.date.and_time(self.slot.start)
    }

    pub fn patient(&self) -> Recipient {
        Recipient {
            user_id: self.patient_id,
            role: ActorRole::Patient,
        }
    }

    pub fn doctor(&self) -> Recipient {
        Recipient {
            user_id: self.doctor_id,
            role: ActorRole::Doctor,
        }
    }

    pub fn is_participant(&self, actor: &Actor) -> bool {
        match actor.role {
            ActorRole::Patient => self.patient_id == actor.user_id,
            ActorRole::Doctor => self.doctor_id == actor.user_id,
            ActorRole::Admin | ActorRole::System => true,
        }
    }
}

/// One status for storage, history and API alike.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    PendingPatientConfirmation,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
    NoShow,
}

impl AppointmentStatus {
    const ESCAPES: [AppointmentStatus; 3] = [
        AppointmentStatus::Cancelled,
        AppointmentStatus::Rejected,
        AppointmentStatus::NoShow,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rejected
                | AppointmentStatus::NoShow
        )
    }

    /// Statuses in which the appointment owns its slot.
    pub fn holds_slot(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::PendingPatientConfirmation
                | AppointmentStatus::Confirmed
                | AppointmentStatus::InProgress
        )
    }

    pub fn frees_slot(&self) -> bool {
        self.is_terminal()
    }

    /// All valid next statuses.
    pub fn valid_transitions(&self) -> Vec<AppointmentStatus> {
        let forward: &[AppointmentStatus] = match self {
            AppointmentStatus::Pending => &[
                AppointmentStatus::PendingPatientConfirmation,
                AppointmentStatus::Confirmed,
            ],
            AppointmentStatus::PendingPatientConfirmation => &[AppointmentStatus::Confirmed],
            AppointmentStatus::Confirmed => &[AppointmentStatus::InProgress],
            AppointmentStatus::InProgress => &[AppointmentStatus::Completed],
            // Terminal states
            _ => return Vec::new(),
        };

        forward.iter().chain(Self::ESCAPES.iter()).copied().collect()
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn can_reschedule(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending
                | AppointmentStatus::PendingPatientConfirmation
                | AppointmentStatus::Confirmed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::PendingPatientConfirmation => "pending_patient_confirmation",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    #[default]
    Regular,
    #[serde(alias = "followup")]
    FollowUp,
    Emergency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    Video,
    #[default]
    #[serde(alias = "in-person")]
    InPerson,
}

/// Carried for collaborators; never acted upon here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub status: AppointmentStatus,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Uuid,
    pub actor_role: ActorRole,
    pub notes: Option<String>,
}

impl StatusHistoryEntry {
    pub fn new(status: AppointmentStatus, actor: &Actor, notes: Option<String>) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            actor_id: actor.user_id,
            actor_role: actor.role,
            notes,
        }
    }
}

/// Addressee of a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: Uuid,
    pub role: ActorRole,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    /// Defaults to the caller when a patient books for themself.
    pub patient_id: Option<Uuid>,
    pub date: NaiveDate,
    pub slot: TimeWindow,
    #[serde(default)]
    pub consultation_mode: ConsultationMode,
    pub symptoms: String,
    pub kind: Option<AppointmentKind>,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub slot: TimeWindow,
    #[serde(default)]
    pub requires_confirmation: bool,
    pub notes: Option<String>,
}

// ==============================================================================
// DOMAIN EVENTS
// ==============================================================================

/// Published after every committed state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub appointment: Appointment,
    /// `None` for a newly booked appointment.
    pub old_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    /// Date the appointment was moved away from, when a reschedule changed it.
    #[serde(default)]
    pub previous_date: Option<NaiveDate>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}
