use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        // Booking UI surface
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots))
        .route("/{doctor_id}/schedule", get(handlers::get_schedule))
        // Schedule management
        .route("/{doctor_id}/working-hours", post(handlers::create_working_hour))
        .route(
            "/{doctor_id}/working-hours/{working_hour_id}",
            put(handlers::update_working_hour).delete(handlers::delete_working_hour),
        )
        .route("/{doctor_id}/days-off", post(handlers::create_day_off))
        .with_state(state)
}
