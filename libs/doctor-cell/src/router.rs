use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route(
            "/",
            post(handlers::publish_availability)
                .get(handlers::list_availability)
                .delete(handlers::clear_availability),
        )
        .route("/{doctor_id}/weekly-schedule", get(handlers::get_weekly_schedule))
        .route("/{doctor_id}/weekly-reservations", get(handlers::get_weekly_reservations))
        .route("/{doctor_id}/exceptions", post(handlers::add_doctor_exception))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/referral-search", get(handlers::search_referral_doctors))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
