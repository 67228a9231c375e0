use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::supabase::{SupabaseClient, MERGE_DUPLICATES};

/// Runtime-tunable clinic settings. Persisted as a single record; never kept in
/// process environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicSettings {
    pub reminders_enabled: bool,
    pub reminder_window_min_minutes: i64,
    pub reminder_window_max_minutes: i64,
    pub status_change_notifications: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ClinicSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reminders_enabled: true,
            reminder_window_min_minutes: config.reminder_window_min_minutes,
            reminder_window_max_minutes: config.reminder_window_max_minutes,
            status_change_notifications: true,
            updated_at: None,
        }
    }
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsRequest {
    pub reminders_enabled: Option<bool>,
    pub reminder_window_min_minutes: Option<i64>,
    pub reminder_window_max_minutes: Option<i64>,
    pub status_change_notifications: Option<bool>,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> Result<Option<ClinicSettings>, AppError>;
    async fn save(&self, settings: &ClinicSettings) -> Result<ClinicSettings, AppError>;
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    record: RwLock<Option<ClinicSettings>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn load(&self) -> Result<Option<ClinicSettings>, AppError> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, settings: &ClinicSettings) -> Result<ClinicSettings, AppError> {
        *self.record.write().await = Some(settings.clone());
        Ok(settings.clone())
    }
}

pub struct SupabaseSettingsRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSettingsRepository {
    const SETTINGS_ROW_ID: i32 = 1;

    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SettingsRepository for SupabaseSettingsRepository {
    async fn load(&self) -> Result<Option<ClinicSettings>, AppError> {
        let path = format!("/rest/v1/clinic_settings?id=eq.{}", Self::SETTINGS_ROW_ID);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppError::Persistence(format!("Failed to parse clinic settings: {}", e))
                })
            })
            .transpose()
    }

    async fn save(&self, settings: &ClinicSettings) -> Result<ClinicSettings, AppError> {
        let mut body = serde_json::to_value(settings)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        body["id"] = json!(Self::SETTINGS_ROW_ID);

        let rows: Vec<Value> = self
            .supabase
            .request_preferring(
                Method::POST,
                "/rest/v1/clinic_settings?on_conflict=id",
                Some(body),
                MERGE_DUPLICATES,
            )
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| {
                AppError::Persistence(format!("Failed to parse clinic settings: {}", e))
            }),
            None => Ok(settings.clone()),
        }
    }
}

/// Typed accessor over the persisted settings record.
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    defaults: ClinicSettings,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, defaults: ClinicSettings) -> Self {
        Self { repo, defaults }
    }

    pub async fn get(&self) -> Result<ClinicSettings, AppError> {
        Ok(self.repo.load().await?.unwrap_or_else(|| self.defaults.clone()))
    }

    pub async fn update(&self, request: UpdateSettingsRequest) -> Result<ClinicSettings, AppError> {
        let mut settings = self.get().await?;

        if let Some(enabled) = request.reminders_enabled {
            settings.reminders_enabled = enabled;
        }
        if let Some(min) = request.reminder_window_min_minutes {
            settings.reminder_window_min_minutes = min;
        }
        if let Some(max) = request.reminder_window_max_minutes {
            settings.reminder_window_max_minutes = max;
        }
        if let Some(enabled) = request.status_change_notifications {
            settings.status_change_notifications = enabled;
        }

        if settings.reminder_window_min_minutes < 0 {
            return Err(AppError::ValidationError(
                "Reminder window cannot start in the past".to_string(),
            ));
        }
        if settings.reminder_window_min_minutes > settings.reminder_window_max_minutes {
            return Err(AppError::ValidationError(format!(
                "Reminder window is empty: {} > {}",
                settings.reminder_window_min_minutes, settings.reminder_window_max_minutes
            )));
        }

        settings.updated_at = Some(Utc::now());
        debug!("Saving clinic settings: {:?}", settings);
        let saved = self.repo.save(&settings).await?;
        info!("Clinic settings updated");
        Ok(saved)
    }
}
