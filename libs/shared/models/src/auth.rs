use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Doctor,
    Admin,
    System,
}

impl ActorRole {
    pub fn is_privileged(&self) -> bool {
        matches!(self, ActorRole::Admin | ActorRole::System)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Doctor => write!(f, "doctor"),
            ActorRole::Admin => write!(f, "admin"),
            ActorRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patient" => Ok(ActorRole::Patient),
            "doctor" => Ok(ActorRole::Doctor),
            "admin" => Ok(ActorRole::Admin),
            "system" => Ok(ActorRole::System),
            other => Err(AppError::Forbidden(format!("Unsupported role: {}", other))),
        }
    }
}

/// Identity attached to every core call: who is acting and in which role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: ActorRole) -> Self {
        Self { user_id, role }
    }

    pub fn patient(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::Patient)
    }

    pub fn doctor(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::Doctor)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, ActorRole::Admin)
    }

    /// The scheduler and other background tasks act as this identity.
    pub fn system() -> Self {
        Self::new(Uuid::nil(), ActorRole::System)
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }

    /// Doctor-owned resources (schedule, day layout, queue) are managed by the
    /// doctor themself or a privileged actor.
    pub fn can_manage_doctor(&self, doctor_id: Uuid) -> bool {
        self.is_privileged() || (self.role == ActorRole::Doctor && self.user_id == doctor_id)
    }

    pub fn require_doctor_access(&self, doctor_id: Uuid) -> Result<(), AppError> {
        if self.can_manage_doctor(doctor_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} {} cannot manage doctor {}",
                self.role, self.user_id, doctor_id
            )))
        }
    }
}

impl TryFrom<&User> for Actor {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Invalid user ID format".to_string()))?;
        let role = user
            .role
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("User has no role".to_string()))?
            .parse()?;

        Ok(Self { user_id, role })
    }
}
