use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer, Config};
use crate::handlers::{events, event_types, health_check, history, registrations};
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/event-types", get(event_types))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route(
            "/events/:id/registrations",
            post(registrations::register_for_event),
        )
        .route("/me/registrations", get(history::my_registrations))
        .route("/me/events", get(history::my_events))
        .with_state(state)
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    apply_security_headers(api_router(state), config.production)
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}
