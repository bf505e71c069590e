// libs/appointment-cell/tests/booking_test.rs
//
// Integration tests for the booking flow against a mocked PostgREST
// backend: validation short-circuits, the lost-race conflict mapping and
// the lifecycle endpoints.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingRejection,
    CancelAppointmentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use shared_config::{AppConfig, FeePolicy};

fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        supabase_url: base_url.to_string(),
        supabase_service_key: "test-key".to_string(),
        fee_policy: FeePolicy::default(),
    }
}

fn doctor_id() -> Uuid {
    Uuid::parse_str("750e8400-e29b-41d4-a716-446655440001").unwrap()
}

fn patient_id() -> Uuid {
    Uuid::parse_str("750e8400-e29b-41d4-a716-446655440002").unwrap()
}

fn appointment_id() -> Uuid {
    Uuid::parse_str("750e8400-e29b-41d4-a716-446655440003").unwrap()
}

// A Monday far in the future.
fn booking_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

fn doctor_row() -> serde_json::Value {
    serde_json::json!({
        "id": doctor_id(),
        "clinic_id": Uuid::new_v4(),
        "specialization": "Dermatology",
        "consultation_fee": "150.00",
        "is_available": true
    })
}

fn working_hour_row() -> serde_json::Value {
    serde_json::json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id(),
        "day_of_week": 1,
        "start_time": "09:00:00",
        "end_time": "17:00:00",
        "is_active": true
    })
}

fn appointment_row(status: &str, is_paid: bool) -> serde_json::Value {
    serde_json::json!({
        "id": appointment_id(),
        "patient_id": patient_id(),
        "doctor_id": doctor_id(),
        "clinic_id": Uuid::new_v4(),
        "service_id": null,
        "date": "2030-06-03",
        "start_time": "10:00:00",
        "end_time": "10:30:00",
        "symptoms": "",
        "notes": "",
        "status": status,
        "base_price": "200.00",
        "cancellation_fee": "0",
        "late_payment_fee": "0",
        "total_amount": "200.00",
        "is_paid": is_paid,
        "paid_at": null,
        "payment_due_date": "2030-06-28T10:00:00Z",
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339(),
        "confirmed_at": null,
        "canceled_at": null,
        "cancellation_reason": ""
    })
}

fn booking_request(date: NaiveDate) -> BookAppointmentRequest {
    BookAppointmentRequest {
        patient_id: patient_id(),
        doctor_id: doctor_id(),
        service_id: None,
        date,
        start_time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        symptoms: Some("headache".into()),
        notes: None,
    }
}

async fn mount_bookable_schedule(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_row()]))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/working_hours"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![working_hour_row()]))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/days_off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn booking_a_free_slot_creates_a_pending_appointment() {
    let server = MockServer::start().await;
    mount_bookable_schedule(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![appointment_row("PENDING", false)]))
        .expect(1)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let appointment = service.book_appointment(booking_request(booking_date())).await.unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.doctor_id, doctor_id());
    assert!(appointment.payment_due_date.is_some());
}

#[tokio::test]
async fn past_date_is_rejected_before_any_insert() {
    let server = MockServer::start().await;
    mount_bookable_schedule(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
    let err = service.book_appointment(booking_request(yesterday)).await.unwrap_err();

    assert!(matches!(
        err,
        AppointmentError::Rejected(BookingRejection::PastDate)
    ));
}

#[tokio::test]
async fn time_outside_working_hours_is_rejected() {
    let server = MockServer::start().await;
    mount_bookable_schedule(&server).await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let mut request = booking_request(booking_date());
    request.start_time = chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap();

    let err = service.book_appointment(request).await.unwrap_err();

    assert!(matches!(
        err,
        AppointmentError::Rejected(BookingRejection::OutsideWorkingHours)
    ));
}

#[tokio::test]
async fn lost_insert_race_surfaces_as_slot_taken() {
    let server = MockServer::start().await;
    mount_bookable_schedule(&server).await;

    // The validator saw a free slot, but the concurrent writer got there
    // first: the storage uniqueness constraint answers 409.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key value"))
        .expect(1)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let err = service.book_appointment(booking_request(booking_date())).await.unwrap_err();

    assert!(matches!(err, AppointmentError::SlotTaken));
}

#[tokio::test]
async fn confirming_a_pending_appointment_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row("PENDING", false)]))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(1)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let appointment = service.confirm_appointment(appointment_id()).await.unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
    assert!(appointment.confirmed_at.is_some());
}

#[tokio::test]
async fn confirming_a_completed_appointment_is_rejected_without_mutation() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row("COMPLETED", false)]))
        .mount(&server)
        .await;

    // No write may happen on a rejected transition.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let err = service.confirm_appointment(appointment_id()).await.unwrap_err();

    assert!(matches!(
        err,
        AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed)
    ));
}

#[tokio::test]
async fn early_cancellation_persists_without_touching_the_ledger() {
    let server = MockServer::start().await;

    // Unpaid, pending, far in the future: free cancellation.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row("PENDING", false)]))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/cancel_with_refund"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&server.uri()));
    let appointment = service
        .cancel_appointment(
            appointment_id(),
            CancelAppointmentRequest {
                reason: Some("travel".into()),
                acknowledge_fee: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Canceled);
    assert_eq!(appointment.cancellation_reason, "travel");
    assert!(appointment.cancellation_fee.is_zero());
}
