use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::state::AppState;
use crate::utils::response::success;

pub mod events;
pub mod history;
pub mod identity;
pub mod registrations;

pub use identity::AuthenticatedUser;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "eventhive-api",
    };

    success(payload, "Health check successful")
}

pub async fn event_types(State(state): State<AppState>) -> Response {
    success(state.catalog.event_types(), "Event types retrieved")
}
