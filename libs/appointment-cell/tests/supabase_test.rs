// libs/appointment-cell/tests/supabase_test.rs
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::{
    Appointment, AppointmentError, AppointmentKind, AppointmentRepository, AppointmentStatus,
    ConsultationMode, PaymentStatus, SupabaseAppointmentRepository,
};
use availability_cell::TimeWindow;
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

fn repository(server: &MockServer) -> SupabaseAppointmentRepository {
    let config = TestConfig::with_supabase(&server.uri()).to_app_config();
    SupabaseAppointmentRepository::new(Arc::new(SupabaseClient::new(&config)))
}

fn appointment(status: AppointmentStatus) -> Appointment {
    let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
    Appointment {
        id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        date,
        date_key: "2030-01-07".to_string(),
        slot: TimeWindow::new(
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        ),
        kind: AppointmentKind::Regular,
        consultation_mode: ConsultationMode::Video,
        status,
        payment_status: PaymentStatus::Pending,
        duration_minutes: 30,
        symptoms: "Headache".to_string(),
        reminder_sent: false,
        status_history: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn conditional_write_filters_on_expected_status() {
    let server = MockServer::start().await;
    let confirmed = appointment(AppointmentStatus::Confirmed);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", confirmed.id)))
        .and(query_param("status", "eq.pending"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({ "status": "confirmed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
        .expect(1)
        .mount(&server)
        .await;

    let saved = repository(&server)
        .update_if_status(&confirmed, AppointmentStatus::Pending)
        .await
        .unwrap();
    assert_eq!(saved.status, AppointmentStatus::Confirmed);
    assert_eq!(saved.slot.start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
}

#[tokio::test]
async fn conditional_write_reports_stale_status() {
    let server = MockServer::start().await;
    let update = appointment(AppointmentStatus::Confirmed);
    let mut stored = update.clone();
    stored.status = AppointmentStatus::Cancelled;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", update.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&server)
        .await;

    let result = repository(&server)
        .update_if_status(&update, AppointmentStatus::Pending)
        .await;
    assert_matches!(
        result,
        Err(AppointmentError::StaleWrite {
            expected: AppointmentStatus::Pending,
            current: AppointmentStatus::Cancelled,
        })
    );
}

#[tokio::test]
async fn conditional_write_leaves_reminder_flag_alone() {
    let server = MockServer::start().await;
    let started = appointment(AppointmentStatus::InProgress);
    let mut stored = started.clone();
    stored.reminder_sent = true;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.confirmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .expect(1)
        .mount(&server)
        .await;

    let saved = repository(&server)
        .update_if_status(&started, AppointmentStatus::Confirmed)
        .await
        .unwrap();
    assert!(saved.reminder_sent);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["status"], "in_progress");
    assert!(body.get("reminder_sent").is_none());
}

#[tokio::test]
async fn reminder_flag_is_a_guarded_patch() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("reminder_sent", "eq.false"))
        .and(body_partial_json(json!({ "reminder_sent": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": id }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let repo = repository(&server);
    assert!(repo.mark_reminder_sent(id).await.unwrap());
    assert!(!repo.mark_reminder_sent(id).await.unwrap());
}

#[tokio::test]
async fn reminder_candidates_query() {
    let server = MockServer::start().await;
    let due = appointment(AppointmentStatus::Confirmed);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.confirmed"))
        .and(query_param("reminder_sent", "eq.false"))
        .and(query_param("date", "in.(2030-01-07,2030-01-08)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([due])))
        .expect(1)
        .mount(&server)
        .await;

    let candidates = repository(&server)
        .reminder_candidates(&[
            NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            NaiveDate::from_ymd_opt(2030, 1, 8).unwrap(),
        ])
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, due.id);
}
