use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{AvailabilityError, DateRange, DayOfWeek, SlotInput};
use doctor_cell::services::AvailabilityService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const TOKEN: &str = "test-token";

fn slot(day: u32, hour: u32) -> SlotInput {
    SlotInput {
        weekday: None,
        availability_start: Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap(),
        availability_end: Utc.with_ymd_and_hms(2025, 3, day, hour, 30, 0).unwrap(),
        slot_duration: Some(30),
    }
}

fn march(start: u32, end: u32) -> DateRange {
    DateRange {
        start: NaiveDate::from_ymd_opt(2025, 3, start).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 3, end).unwrap(),
    }
}

#[tokio::test]
async fn test_publish_with_range_only_replaces_slots_inside_it() {
    let mock_server = MockServer::start().await;
    let doctor_id = "0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e";

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availabilities"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("availability_start", "gte.2025-03-10T00:00:00Z"))
        .and(query_param("availability_start", "lt.2025-03-17T00:00:00Z"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availabilities"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    // the 9th and 17th fall outside the range
    let stored = service
        .publish_availability(doctor_id, Some(march(10, 16)), vec![slot(9, 9), slot(10, 9), slot(16, 14), slot(17, 9)], TOKEN)
        .await
        .unwrap();

    assert_eq!(stored, 2);

    let requests = mock_server.received_requests().await.unwrap();
    let insert = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
    let rows: Vec<Value> = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0]["availability_id"], rows[1]["availability_id"]);
    assert_eq!(rows[0]["doctor_id"], doctor_id);
    // weekday is derived from the start when the caller omits it
    assert_eq!(rows[0]["weekday"], json!(DayOfWeek::Monday));
}

#[tokio::test]
async fn test_publish_without_range_resets_every_slot() {
    let mock_server = MockServer::start().await;
    let doctor_id = "0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e";

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availabilities"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availabilities"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    let stored = service
        .publish_availability(doctor_id, None, vec![slot(1, 9), slot(28, 9)], TOKEN)
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let requests = mock_server.received_requests().await.unwrap();
    let delete = requests.iter().find(|r| r.method.as_str() == "DELETE").unwrap();
    assert!(!delete.url.query().unwrap_or_default().contains("availability_start"));
}

#[tokio::test]
async fn test_publish_surfaces_store_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availabilities"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("boom", "XX000"),
        ))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    let result = service.publish_availability("doc", None, vec![slot(10, 9)], TOKEN).await;

    assert_matches!(result, Err(AvailabilityError::DatabaseError(_)));
}

#[tokio::test]
async fn test_list_uses_later_of_day_start_and_current_time() {
    let mock_server = MockServer::start().await;
    let doctor_id = "0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e";

    Mock::given(method("GET"))
        .and(path("/rest/v1/availabilities"))
        .and(query_param("availability_start", "gte.2025-03-10T11:00:00Z"))
        .and(query_param("availability_end", "lt.2025-03-11T00:00:00Z"))
        .and(query_param("order", "availability_start.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_slot_response(doctor_id, "2025-03-10T11:00:00Z", "2025-03-10T11:30:00Z"),
            MockSupabaseResponses::availability_slot_response(doctor_id, "2025-03-10T11:30:00Z", "2025-03-10T12:00:00Z"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    let slots = service
        .list_availability(
            doctor_id,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap(),
            TOKEN,
        )
        .await
        .unwrap();

    assert_eq!(slots.len(), 2);
    assert!(slots[0].availability_start < slots[1].availability_start);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availabilities"))
        .and(query_param("doctor_id", "eq.doc-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    service.clear_availability("doc-1", TOKEN).await.unwrap();
    service.clear_availability("doc-1", TOKEN).await.unwrap();
}

#[tokio::test]
async fn test_weekly_schedule_fills_missing_days() {
    let mock_server = MockServer::start().await;
    let doctor_id = "0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e";

    Mock::given(method("GET"))
        .and(path("/rest/v1/availabilities"))
        .and(query_param("availability_start", "gte.2025-03-10T00:00:00Z"))
        .and(query_param("availability_start", "lt.2025-03-17T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_slot_response(doctor_id, "2025-03-10T09:00:00Z", "2025-03-10T09:30:00Z"),
            MockSupabaseResponses::availability_slot_response(doctor_id, "2025-03-10T16:30:00Z", "2025-03-10T17:00:00Z"),
        ])))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    let schedule = service.weekly_schedule(doctor_id, march(10, 16), TOKEN).await.unwrap();

    assert_eq!(schedule.len(), 7);
    assert!(schedule[0].enabled);
    assert_eq!(schedule[0].start, "09:00");
    assert_eq!(schedule[0].end, "17:00");
    assert!(schedule[1..].iter().all(|day| !day.enabled && day.slot_duration == 30));
}

#[tokio::test]
async fn test_weekly_reservations_reads_calendar_view() {
    let mock_server = MockServer::start().await;
    let doctor_id = "0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e";
    let patient_id = "7d3c1b2a-1111-4e2f-8a9b-0c1d2e3f4a5b";

    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_details"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("order", "appointment_start.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::reservation_details_response(
                "c0ffee00-0000-4000-8000-000000000001", doctor_id, patient_id, "patient",
            )
        ])))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&TestConfig::with_store(&mock_server.uri()).to_app_config());
    let reservations = service.weekly_reservations(doctor_id, march(10, 16), TOKEN).await.unwrap();

    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].patient_first_name.as_deref(), Some("Amina"));
}
