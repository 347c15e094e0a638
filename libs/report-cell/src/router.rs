use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn report_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_report))
        .route("/doctor/{doctor_id}", get(handlers::list_doctor_reports))
        .route(
            "/{report_id}",
            get(handlers::get_report)
                .put(handlers::update_report)
                .delete(handlers::delete_report),
        )
        .route("/patients/{patient_id}/medications", get(handlers::get_patient_medications))
        .route("/patients/{patient_id}/diagnoses", get(handlers::get_diagnosis_history))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
