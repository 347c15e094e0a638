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
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateReportRequest, MedicalReport, ReportContent, ReportError, ReportFilters};
use crate::services::ReportService;

fn report_error(e: ReportError) -> AppError {
    match e {
        ReportError::NotFound => AppError::NotFound(e.to_string()),
        ReportError::ConcurrentUpdate | ReportError::AlreadyExists => AppError::Conflict(e.to_string()),
        ReportError::ValidationError(msg) => AppError::ValidationError(msg),
        ReportError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

/// Only doctors write reports.
fn require_doctor(user: &User) -> Result<Uuid, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Auth("Only doctors can manage medical reports".to_string()));
    }
    caller_id(user)
}

// ==============================================================================
// REPORT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    body: Result<Json<CreateReportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = body?;
    let doctor_id = require_doctor(&user)?;

    let report_service = ReportService::new(&state);
    let report = report_service
        .create_report(doctor_id, request, auth.token())
        .await
        .map_err(report_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Report created successfully",
            "report": report
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_doctor_reports(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ReportFilters>, QueryRejection>,
) -> Result<Json<Vec<MedicalReport>>, AppError> {
    let Path(doctor_id) = path?;
    let Query(filters) = query?;

    if caller_id(&user)? != doctor_id {
        return Err(AppError::Auth("Not authorized to view these reports".to_string()));
    }

    let report_service = ReportService::new(&state);
    let reports = report_service
        .list_reports(doctor_id, &filters, auth.token())
        .await
        .map_err(report_error)?;

    Ok(Json(reports))
}

#[axum::debug_handler]
pub async fn get_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MedicalReport>, AppError> {
    let Path(report_id) = path?;
    let caller = caller_id(&user)?;

    let report_service = ReportService::new(&state);
    let report = report_service.get_report(report_id, caller, auth.token()).await
        .map_err(report_error)?;

    Ok(Json(report))
}

#[axum::debug_handler]
pub async fn update_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ReportContent>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(report_id) = path?;
    let Json(content) = body?;
    let doctor_id = require_doctor(&user)?;

    let report_service = ReportService::new(&state);
    report_service
        .update_report(report_id, doctor_id, content, auth.token())
        .await
        .map_err(report_error)?;

    Ok(Json(json!({
        "message": "Report updated successfully",
        "report_id": report_id
    })))
}

#[axum::debug_handler]
pub async fn delete_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(report_id) = path?;
    let doctor_id = require_doctor(&user)?;

    let report_service = ReportService::new(&state);
    report_service
        .delete_report(report_id, doctor_id, auth.token())
        .await
        .map_err(report_error)?;

    Ok(Json(json!({ "message": "Report deleted successfully" })))
}

// ==============================================================================
// PATIENT RECORD HANDLERS
// ==============================================================================

fn require_patient_access(user: &User, patient_id: Uuid) -> Result<(), AppError> {
    if caller_id(user)? != patient_id && !user.is_doctor() {
        return Err(AppError::Auth("Not authorized to view this patient's records".to_string()));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn get_patient_medications(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(patient_id) = path?;
    require_patient_access(&user, patient_id)?;

    let report_service = ReportService::new(&state);
    let medications = report_service.patient_medications(patient_id, auth.token()).await
        .map_err(report_error)?;

    Ok(Json(json!({ "medications": medications })))
}

#[axum::debug_handler]
pub async fn get_diagnosis_history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(patient_id) = path?;
    require_patient_access(&user, patient_id)?;

    let report_service = ReportService::new(&state);
    let history = report_service.diagnosis_history(patient_id, auth.token()).await
        .map_err(report_error)?;

    Ok(Json(json!({ "diagnoses": history })))
}
