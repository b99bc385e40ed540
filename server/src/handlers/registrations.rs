use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::identity::AuthenticatedUser;
use crate::services::{PaymentDetails, RegistrationRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub tickets: u32,
    pub payment: PaymentDetails,
}

/// Takes payment for the requested tickets and registers the caller.
///
/// Requests that can never succeed are refused before any payment is taken.
pub async fn register_for_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(event_id): Path<Uuid>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    if body.tickets < 1 {
        return Err(AppError::ValidationError(
            "Ticket count must be positive".to_string(),
        ));
    }

    let event = state.catalog.get_event(event_id).await?;
    if body.tickets > event.ticket_count {
        return Err(AppError::InsufficientInventory {
            requested: body.tickets,
            available: event.ticket_count,
        });
    }

    let amount = event.registration_fee * Decimal::from(body.tickets);
    let payment = state.payments.confirm(amount, &body.payment).await?;

    let receipt = state
        .registrations
        .register(RegistrationRequest {
            event_id,
            user,
            requested_tickets: body.tickets,
            payment,
        })
        .await?;

    if receipt.created {
        Ok(created(receipt, "Registration confirmed"))
    } else {
        Ok(success(receipt, "Registration updated"))
    }
}
