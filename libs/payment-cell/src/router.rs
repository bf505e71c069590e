use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/appointments/{appointment_id}/charge", post(handlers::charge_appointment))
        .route(
            "/appointments/{appointment_id}/charge-saved",
            post(handlers::charge_with_saved_card),
        )
        .route("/history", get(handlers::payment_history))
        .route("/cards", get(handlers::list_cards))
        .route("/cards/{card_id}", delete(handlers::delete_card))
        .route("/cards/{card_id}/default", post(handlers::set_default_card))
        .with_state(state)
}
