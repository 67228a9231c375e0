// libs/queue-cell/src/repository.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, MERGE_DUPLICATES};
use shared_models::time;

use crate::error::QueueError;
use crate::models::QueueDay;

#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn get_day(&self, doctor_id: Uuid, date: NaiveDate)
        -> Result<Option<QueueDay>, QueueError>;

    /// Upsert keyed on (doctor, date).
    async fn save_day(&self, day: &QueueDay) -> Result<QueueDay, QueueError>;
}

#[derive(Default)]
pub struct InMemoryQueueRepository {
    days: RwLock<HashMap<(Uuid, NaiveDate), QueueDay>>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn get_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<QueueDay>, QueueError> {
        Ok(self.days.read().await.get(&(doctor_id, date)).cloned())
    }

    async fn save_day(&self, day: &QueueDay) -> Result<QueueDay, QueueError> {
        self.days
            .write()
            .await
            .insert((day.doctor_id, day.date), day.clone());
        Ok(day.clone())
    }
}

/// `queue_days` table with the entry list as a jsonb column.
pub struct SupabaseQueueRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseQueueRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn parse_day(row: Value) -> Result<QueueDay, QueueError> {
    serde_json::from_value(row)
        .map_err(|e| QueueError::Persistence(format!("Failed to parse queue day: {}", e)))
}

#[async_trait]
impl QueueRepository for SupabaseQueueRepository {
    async fn get_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<QueueDay>, QueueError> {
        let path = format!(
            "/rest/v1/queue_days?doctor_id=eq.{}&date=eq.{}",
            doctor_id,
            time::date_key(date)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))?;

        rows.into_iter().next().map(parse_day).transpose()
    }

    async fn save_day(&self, day: &QueueDay) -> Result<QueueDay, QueueError> {
        let body =
            serde_json::to_value(day).map_err(|e| QueueError::Persistence(e.to_string()))?;
        let rows: Vec<Value> = self
            .supabase
            .request_preferring(
                Method::POST,
                "/rest/v1/queue_days?on_conflict=doctor_id,date",
                Some(body),
                MERGE_DUPLICATES,
            )
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => parse_day(row),
            None => Ok(day.clone()),
        }
    }
}
