// libs/appointment-cell/src/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, RETURN_REPRESENTATION};
use shared_models::time;

use crate::error::AppointmentError;
use crate::models::{Appointment, AppointmentStatus};
use crate::repository::AppointmentRepository;

fn persistence(e: impl std::fmt::Display) -> AppointmentError {
    AppointmentError::Persistence(e.to_string())
}

fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| persistence(format!("Failed to parse appointment: {}", e)))
        })
        .collect()
}

fn in_filter<T: ToString>(values: &[T]) -> String {
    let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("in.({})", joined.join(","))
}

/// `appointments` table; `slot` and `status_history` are jsonb columns.
pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(appointment).map_err(persistence)?;
        let rows: Vec<Value> = self
            .supabase
            .request_preferring(
                Method::POST,
                "/rest/v1/appointments",
                Some(body),
                RETURN_REPRESENTATION,
            )
            .await
            .map_err(persistence)?;

        Ok(parse_appointments(rows)?
            .into_iter()
            .next()
            .unwrap_or_else(|| appointment.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Ok(parse_appointments(rows)?.into_iter().next())
    }

    async fn update_if_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, expected
        );
        let mut body = serde_json::to_value(appointment).map_err(persistence)?;
        // reminder_sent is only ever set by mark_reminder_sent
        if let Some(row) = body.as_object_mut() {
            row.remove("reminder_sent");
        }

        let rows: Vec<Value> = self
            .supabase
            .request_preferring(Method::PATCH, &path, Some(body), RETURN_REPRESENTATION)
            .await
            .map_err(persistence)?;

        if let Some(updated) = parse_appointments(rows)?.into_iter().next() {
            return Ok(updated);
        }

        debug!(
            "Conditional write on appointment {} matched no row (expected {})",
            appointment.id, expected
        );
        match self.get(appointment.id).await? {
            Some(current) => Err(AppointmentError::StaleWrite {
                expected,
                current: current.status,
            }),
            None => Err(AppointmentError::NotFound(appointment.id)),
        }
    }

    async fn list_for_doctor_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}",
            doctor_id,
            time::date_key(date)
        );
        if !statuses.is_empty() {
            path.push_str(&format!("&status={}", in_filter(statuses)));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        let mut appointments = parse_appointments(rows)?;
        appointments.sort_by_key(|a| a.slot.start);
        Ok(appointments)
    }

    async fn reminder_candidates(
        &self,
        dates: &[NaiveDate],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = dates.iter().map(|d| time::date_key(*d)).collect();
        let path = format!(
            "/rest/v1/appointments?status=eq.confirmed&reminder_sent=eq.false&date={}",
            in_filter(&keys)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        parse_appointments(rows)
    }

    async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&reminder_sent=eq.false", id);
        let body = json!({
            "reminder_sent": true,
            "updated_at": Utc::now(),
        });

        let rows: Vec<Value> = self
            .supabase
            .request_preferring(Method::PATCH, &path, Some(body), RETURN_REPRESENTATION)
            .await
            .map_err(persistence)?;

        Ok(!rows.is_empty())
    }
}
