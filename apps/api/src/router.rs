use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use slot_cell::router::slot_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "CareBook API is running!" }))
        .nest("/slots", slot_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
}
