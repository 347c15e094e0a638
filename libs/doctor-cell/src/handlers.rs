use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AvailabilityError, DateRange, DoctorException, PublishAvailabilityRequest, ReferralSearchQuery,
};
use crate::services::availability::{expand_weekly_template, parse_date, parse_date_range};
use crate::services::{AvailabilityService, ReferralResolver};

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRangeQuery {
    fn required(&self) -> Result<DateRange, AppError> {
        parse_date_range(self.start.as_deref(), self.end.as_deref())
            .map_err(availability_error)?
            .ok_or_else(|| AppError::BadRequest("start and end are required".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityListQuery {
    pub doctor_id: Option<Uuid>,
    pub day: Option<String>,
    pub current_time: Option<DateTime<Utc>>,
}

fn availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

/// Publishes the caller's availability from a weekly template, a raw slot
/// list, or a `{start, end, availabilities}` object.
#[axum::debug_handler]
pub async fn publish_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DateRangeQuery>,
    body: Result<Json<PublishAvailabilityRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let Json(request) = body?;

    let (range, slots, message) = match request {
        // `[]` deserializes as a template; with no entries it is an empty slot list
        PublishAvailabilityRequest::WeeklyTemplate(entries) if entries.is_empty() => {
            let range = parse_date_range(query.start.as_deref(), query.end.as_deref())
                .map_err(availability_error)?;
            (range, Vec::new(), "Availability set successfully")
        }
        PublishAvailabilityRequest::WeeklyTemplate(entries) => {
            let range = query.required()?;
            let slots = expand_weekly_template(&entries, range).map_err(availability_error)?;
            (Some(range), slots, "Weekly schedule set successfully")
        }
        PublishAvailabilityRequest::Slots(slots) => {
            let range = parse_date_range(query.start.as_deref(), query.end.as_deref())
                .map_err(availability_error)?;
            (range, slots, "Availability set successfully")
        }
        PublishAvailabilityRequest::Ranged { start, end, availabilities } => {
            let start = start.filter(|s| !s.is_empty()).or(query.start);
            let end = end.filter(|s| !s.is_empty()).or(query.end);
            let range = parse_date_range(start.as_deref(), end.as_deref()).map_err(availability_error)?;
            (range, availabilities, "Availability set successfully")
        }
    };

    let availability_service = AvailabilityService::new(&state);
    let stored = availability_service
        .publish_availability(&user.id, range, slots, token)
        .await
        .map_err(availability_error)?;

    Ok(Json(json!({
        "message": message,
        "slots_created": stored
    })))
}

#[axum::debug_handler]
pub async fn clear_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    availability_service.clear_availability(&user.id, auth.token()).await
        .map_err(availability_error)?;

    Ok(Json(json!({
        "message": "All availabilities cleared successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    query: Result<Query<AvailabilityListQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(query) = query?;

    let (Some(doctor_id), Some(day), Some(current_time)) = (query.doctor_id, query.day, query.current_time) else {
        return Err(AppError::BadRequest("doctorId, day, and currentTime are required".to_string()));
    };
    let day = parse_date(&day, "day").map_err(availability_error)?;

    let availability_service = AvailabilityService::new(&state);
    let availabilities = availability_service
        .list_availability(&doctor_id.to_string(), day, current_time, auth.token())
        .await
        .map_err(availability_error)?;

    Ok(Json(json!({ "availabilities": availabilities })))
}

#[axum::debug_handler]
pub async fn get_weekly_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let range = query.required()?;

    let availability_service = AvailabilityService::new(&state);
    let schedule = availability_service
        .weekly_schedule(&doctor_id.to_string(), range, auth.token())
        .await
        .map_err(availability_error)?;

    Ok(Json(json!({ "weeklySchedule": schedule })))
}

#[axum::debug_handler]
pub async fn get_weekly_reservations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let range = query.required()?;

    let availability_service = AvailabilityService::new(&state);
    let reservations = availability_service
        .weekly_reservations(&doctor_id.to_string(), range, auth.token())
        .await
        .map_err(availability_error)?;

    Ok(Json(json!({ "reservations": reservations })))
}

#[axum::debug_handler]
pub async fn add_doctor_exception(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    body: Result<Json<DoctorException>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(exception) = body?;

    if user.id != doctor_id.to_string() {
        return Err(AppError::Auth("Not authorized to manage this doctor's schedule".to_string()));
    }

    let availability_service = AvailabilityService::new(&state);
    availability_service
        .add_exception(&doctor_id.to_string(), exception, auth.token())
        .await
        .map_err(availability_error)?;

    Ok(Json(json!({ "message": "Exception added successfully" })))
}

// ==============================================================================
// REFERRAL HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn search_referral_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ReferralSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let resolver = ReferralResolver::new(&state);

    let doctors = resolver.search_doctors(query, auth.token()).await
        .map_err(|e| {
            tracing::error!("Referral doctor search failed: {}", e);
            AppError::Internal("Failed to search doctors for referral".to_string())
        })?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}
