// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        // Booking and lookup
        .route("/", post(handlers::book_appointment))
        .route("/search", get(handlers::search_appointments))
        .route("/upcoming", get(handlers::get_upcoming_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))

        // Lifecycle transitions
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/reject", post(handlers::reject_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))

        // Reschedule negotiation
        .route("/{appointment_id}/reschedule", post(handlers::propose_reschedule))
        .route("/{appointment_id}/reschedule/approve", post(handlers::approve_reschedule))
        .route("/{appointment_id}/reschedule/decline", post(handlers::decline_reschedule))
        .route("/{appointment_id}/reschedule/withdraw", post(handlers::withdraw_reschedule))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
