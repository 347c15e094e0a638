use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn reservation_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_reservation).get(handlers::list_reservations))
        .route("/count", get(handlers::get_reservation_counts))
        .route("/statistics", get(handlers::get_reservation_statistics))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
