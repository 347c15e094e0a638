use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentBucket, AppointmentError, CancelAppointmentRequest, CreateReservationRequest,
    Reservation, ReservationCounts, UserRole, ViewAs,
};
use crate::services::{ReservationService, ReservationViewService};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationListQuery {
    pub user_id: Option<Uuid>,
    pub user_type: Option<String>,
    pub timezone: Option<String>,
    pub view_as: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReservationCountQuery {
    pub user_id: Option<Uuid>,
    pub user_type: Option<String>,
    pub appointment_type: Option<String>,
}

fn appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound(e.to_string()),
        AppointmentError::ConflictDetected => AppError::Conflict(e.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Callers may only read their own calendar and counters.
fn require_self(user: &User, user_id: Uuid) -> Result<(), AppError> {
    if user.id != user_id.to_string() {
        return Err(AppError::Auth("Not authorized to view another user's reservations".to_string()));
    }
    Ok(())
}

fn required_identity(user_id: Option<Uuid>, user_type: Option<&str>) -> Result<(Uuid, UserRole), AppError> {
    let (Some(user_id), Some(user_type)) = (user_id, user_type.filter(|t| !t.trim().is_empty())) else {
        return Err(AppError::BadRequest("user id and user type are required".to_string()));
    };
    let role = user_type.parse::<UserRole>().map_err(appointment_error)?;
    Ok((user_id, role))
}

// ==============================================================================
// RESERVATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_reservation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    body: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = body?;

    let acting_role = user.user_type().and_then(|t| t.parse::<UserRole>().ok());

    let reservation_service = ReservationService::new(&state);
    let appointment_id = reservation_service
        .create_reservation(request, acting_role, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Reservation created successfully",
            "appointment_id": appointment_id
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_reservations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    query: Result<Query<ReservationListQuery>, QueryRejection>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let Query(query) = query?;

    let (user_id, role) = required_identity(query.user_id, query.user_type.as_deref())?;
    let view_as = ViewAs::parse_optional(query.view_as.as_deref()).map_err(appointment_error)?;
    require_self(&user, user_id)?;

    let timezone = query
        .timezone
        .filter(|tz| !tz.trim().is_empty())
        .unwrap_or_else(|| state.default_timezone.clone());

    let view_service = ReservationViewService::new(&state);
    let reservations = view_service
        .list_reservations(user_id, role, &timezone, view_as, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(reservations))
}

#[axum::debug_handler]
pub async fn get_reservation_counts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    query: Result<Query<ReservationCountQuery>, QueryRejection>,
) -> Result<Json<ReservationCounts>, AppError> {
    let Query(query) = query?;

    let (user_id, role) = required_identity(query.user_id, query.user_type.as_deref())?;
    let bucket = match query.appointment_type.as_deref() {
        Some(value) => value.parse::<AppointmentBucket>().map_err(appointment_error)?,
        None => AppointmentBucket::default(),
    };
    require_self(&user, user_id)?;

    let reservation_service = ReservationService::new(&state);
    let counts = reservation_service
        .counts_by_bucket(&user_id.to_string(), role, bucket, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(counts))
}

#[axum::debug_handler]
pub async fn get_reservation_statistics(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    query: Result<Query<ReservationCountQuery>, QueryRejection>,
) -> Result<Json<ReservationCounts>, AppError> {
    let Query(query) = query?;

    let (user_id, role) = required_identity(query.user_id, query.user_type.as_deref())?;
    require_self(&user, user_id)?;

    let reservation_service = ReservationService::new(&state);
    let counts = reservation_service
        .statistics(&user_id.to_string(), role, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(counts))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CancelAppointmentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(appointment_id) = path?;
    let Json(request) = body?;

    let reservation_service = ReservationService::new(&state);
    reservation_service
        .cancel_appointment(appointment_id, request, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment canceled successfully",
        "appointment_id": appointment_id
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Reservation>, AppError> {
    let Path(appointment_id) = path?;

    let reservation_service = ReservationService::new(&state);
    let reservation = reservation_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(appointment_error)?;

    Ok(Json(reservation))
}
