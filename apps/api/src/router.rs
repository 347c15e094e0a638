use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, reservation_routes};
use doctor_cell::router::{availability_routes, doctor_routes};
use report_cell::router::report_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/reservations", reservation_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/reports", report_routes(state))
}
