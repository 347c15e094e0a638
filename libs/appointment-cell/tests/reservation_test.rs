use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentBucket, AppointmentError, CancelAppointmentRequest, CreateReservationRequest, UserRole,
};
use appointment_cell::services::ReservationService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const TOKEN: &str = "test-token";

fn service(mock_server: &MockServer) -> ReservationService {
    ReservationService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config())
}

fn booking(doctor_id: Uuid, patient_id: Uuid) -> CreateReservationRequest {
    CreateReservationRequest {
        doctor_id,
        patient_id,
        appointment_start: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
        appointment_end: Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap(),
        title: "Consultation".to_string(),
        notes: None,
    }
}

fn count_response(total: u64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Range", format!("*/{}", total).as_str())
        .set_body_json(json!([]))
}

fn cancellation() -> CancelAppointmentRequest {
    CancelAppointmentRequest {
        canceled_by: "patient".to_string(),
        cancellation_reason: Some("Travelling".to_string()),
    }
}

#[tokio::test]
async fn test_booking_consumes_slot_with_exact_start() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .and(body_partial_json(json!({
            "p_start": "2025-03-10T09:00:00+00:00",
            "p_end": "2025-03-10T09:30:00+00:00",
            "p_is_doctor_patient": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "slot_consumed": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = service(&mock_server)
        .create_reservation(booking(Uuid::new_v4(), Uuid::new_v4()), Some(UserRole::Patient), TOKEN)
        .await
        .unwrap();

    assert_eq!(created, appointment_id);
}

#[tokio::test]
async fn test_booking_without_matching_slot_still_succeeds() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "slot_consumed": false
        })))
        .mount(&mock_server)
        .await;

    let created = service(&mock_server)
        .create_reservation(booking(Uuid::new_v4(), Uuid::new_v4()), None, TOKEN)
        .await;

    assert_eq!(created.unwrap(), appointment_id);
}

#[tokio::test]
async fn test_doctor_booking_for_a_peer_doctor_is_flagged() {
    let mock_server = MockServer::start().await;
    let peer_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_info"))
        .and(query_param("doctor_id", format!("eq.{}", peer_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "doctor_id": peer_id }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .and(body_partial_json(json!({ "p_is_doctor_patient": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": Uuid::new_v4(),
            "slot_consumed": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .create_reservation(booking(Uuid::new_v4(), peer_id), Some(UserRole::Doctor), TOKEN)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_patient_booking_skips_doctor_lookup() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .and(body_partial_json(json!({ "p_is_doctor_patient": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": Uuid::new_v4(),
            "slot_consumed": true
        })))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .create_reservation(booking(Uuid::new_v4(), Uuid::new_v4()), Some(UserRole::Patient), TOKEN)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_overlapping_booking_is_a_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::error_response(
            "conflicting key value violates exclusion constraint \"appointments_no_overlap\"",
            "23P01",
        )))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .create_reservation(booking(Uuid::new_v4(), Uuid::new_v4()), Some(UserRole::Patient), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::ConflictDetected));
}

#[tokio::test]
async fn test_store_failure_is_opaque() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .respond_with(ResponseTemplate::new(400).set_body_json(MockSupabaseResponses::error_response(
            "new row violates check constraint \"appointments_check\"",
            "23514",
        )))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .create_reservation(booking(Uuid::new_v4(), Uuid::new_v4()), None, TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(msg)) if msg == "Failed to create reservation");
}

#[tokio::test]
async fn test_book_cancel_rebook_same_window() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": first,
            "slot_consumed": true
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_reservation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": second,
            "slot_consumed": false
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", format!("eq.{}", first)))
        .and(body_partial_json(json!({ "canceled": true, "canceled_by": "patient" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "appointment_id": first }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service(&mock_server);

    let booked = service.create_reservation(booking(doctor_id, patient_id), None, TOKEN).await.unwrap();
    service.cancel_appointment(booked, cancellation(), TOKEN).await.unwrap();
    let rebooked = service.create_reservation(booking(doctor_id, patient_id), None, TOKEN).await.unwrap();

    assert_eq!(booked, first);
    assert_eq!(rebooked, second);
}

#[tokio::test]
async fn test_cancel_twice_succeeds() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "appointment_id": appointment_id }])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = service(&mock_server);

    assert!(service.cancel_appointment(appointment_id, cancellation(), TOKEN).await.is_ok());
    assert!(service.cancel_appointment(appointment_id, cancellation(), TOKEN).await.is_ok());
}

#[tokio::test]
async fn test_cancel_unknown_appointment_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .cancel_appointment(Uuid::new_v4(), cancellation(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn test_get_appointment_missing_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server).get_appointment(Uuid::new_v4(), TOKEN).await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn test_get_appointment_returns_details() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_details"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::reservation_details_response(
                &appointment_id.to_string(),
                &doctor_id.to_string(),
                &patient_id.to_string(),
                "patient",
            )
        ])))
        .mount(&mock_server)
        .await;

    let reservation = service(&mock_server).get_appointment(appointment_id, TOKEN).await.unwrap();

    assert_eq!(reservation.details.appointment_id, appointment_id);
    assert_eq!(reservation.details.patient_first_name.as_deref(), Some("Amina"));
    assert_eq!(reservation.appointment_start, Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
    assert!(!reservation.details.report_exists);
}

#[tokio::test]
async fn test_doctor_statistics_count_both_sides() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("canceled", "is.false"))
        .respond_with(count_response(3))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", doctor_id)))
        .and(query_param("canceled", "is.false"))
        .respond_with(count_response(1))
        .mount(&mock_server)
        .await;

    let counts = service(&mock_server)
        .statistics(&doctor_id, UserRole::Doctor, TOKEN)
        .await
        .unwrap();

    assert_eq!(counts.as_doctor, 3);
    assert_eq!(counts.as_patient, 1);
}

#[tokio::test]
async fn test_canceled_bucket_for_patient() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("canceled", "is.true"))
        .respond_with(count_response(2))
        .expect(1)
        .mount(&mock_server)
        .await;

    let counts = service(&mock_server)
        .counts_by_bucket(&patient_id, UserRole::Patient, AppointmentBucket::Canceled, TOKEN)
        .await
        .unwrap();

    assert_eq!(counts.as_doctor, 0);
    assert_eq!(counts.as_patient, 2);
}

#[tokio::test]
async fn test_counts_come_from_content_range_not_rows() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    // the store caps rows at 1000 but reports the real total
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("limit", "0"))
        .and(header("Prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "0-999/1500")
                .set_body_json(json!([{ "appointment_id": Uuid::new_v4() }])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let counts = service(&mock_server)
        .statistics(&patient_id, UserRole::Patient, TOKEN)
        .await
        .unwrap();

    assert_eq!(counts.as_patient, 1500);
}

#[tokio::test]
async fn test_count_without_content_range_is_a_store_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .statistics(&Uuid::new_v4().to_string(), UserRole::Patient, TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(_)));
}
