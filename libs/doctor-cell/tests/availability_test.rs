// libs/doctor-cell/tests/availability_test.rs
//
// Integration tests for the availability calculator against a mocked
// PostgREST backend.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::services::availability::AvailabilityService;
use shared_config::{AppConfig, FeePolicy};
use shared_database::supabase::SupabaseClient;

fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        supabase_url: base_url.to_string(),
        supabase_service_key: "test-key".to_string(),
        fee_policy: FeePolicy::default(),
    }
}

async fn service_for(server: &MockServer) -> AvailabilityService {
    let config = test_config(&server.uri());
    AvailabilityService::new(Arc::new(SupabaseClient::new(&config)))
}

fn doctor_id() -> Uuid {
    Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
}

// A Monday far enough in the future that no slot is filtered as past.
fn future_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

fn working_hour_row(start: &str, end: &str) -> serde_json::Value {
    serde_json::json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id(),
        "day_of_week": 1,
        "start_time": start,
        "end_time": end,
        "is_active": true
    })
}

#[tokio::test]
async fn full_working_day_yields_sixteen_slots() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/days_off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/working_hours"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![working_hour_row("09:00:00", "17:00:00")]),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let service = service_for(&server).await;
    let slots = service
        .available_slots(doctor_id(), future_monday(), 30)
        .await
        .unwrap();

    assert_eq!(slots.len(), 16);
    assert_eq!(slots.first().unwrap().format("%H:%M").to_string(), "09:00");
    assert_eq!(slots.last().unwrap().format("%H:%M").to_string(), "16:30");
}

#[tokio::test]
async fn day_off_short_circuits_to_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/days_off"))
        .and(query_param("date", "eq.2030-06-03"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![serde_json::json!({ "id": Uuid::new_v4() })]),
        )
        .mount(&server)
        .await;

    // Working hours exist but must never be consulted; if they are, the
    // result would be non-empty.
    Mock::given(method("GET"))
        .and(path("/rest/v1/working_hours"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![working_hour_row("09:00:00", "17:00:00")]),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let service = service_for(&server).await;
    let slots = service
        .available_slots(doctor_id(), future_monday(), 30)
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn booked_appointments_are_removed_from_slots() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/days_off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/working_hours"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![working_hour_row("09:00:00", "11:00:00")]),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            serde_json::json!({ "start_time": "09:30:00" }),
        ]))
        .mount(&server)
        .await;

    let service = service_for(&server).await;
    let slots = service
        .available_slots(doctor_id(), future_monday(), 30)
        .await
        .unwrap();

    let rendered: Vec<String> = slots.iter().map(|s| s.format("%H:%M").to_string()).collect();
    assert_eq!(rendered, vec!["09:00", "10:00", "10:30"]);
}
