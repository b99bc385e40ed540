use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not enough tickets available. Requested: {requested}, Available: {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    #[error("Payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    #[error("Concurrent updates prevented the change after {attempts} attempts")]
    ConcurrencyExhausted { attempts: u32 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Timed out after {after_ms}ms waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Inventory was taken but the ledger could not record it, and the
    /// compensating restore failed as well.
    #[error("Registration for event {event_id} by {user_id} left inconsistent: {reason}")]
    PartialFailure {
        event_id: Uuid,
        user_id: String,
        claim_id: Uuid,
        tickets: u32,
        reason: String,
    },

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientInventory { .. } => StatusCode::CONFLICT,
            AppError::PaymentNotConfirmed(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ConcurrencyExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            AppError::PaymentNotConfirmed(_) => "PAYMENT_NOT_CONFIRMED",
            AppError::ConcurrencyExhausted { .. } => "CONCURRENCY_EXHAUSTED",
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::PartialFailure { .. } => "PARTIAL_FAILURE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether repeating the whole operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrencyExhausted { .. }
                | AppError::StoreUnavailable(_)
                | AppError::Timeout { .. }
        )
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::PaymentNotConfirmed(msg) => msg.clone(),
            AppError::InsufficientInventory { available, .. } => {
                format!("Only {} tickets available", available)
            }
            AppError::ConcurrencyExhausted { .. } => {
                "The event is busy right now, please try again".to_string()
            }
            AppError::StoreUnavailable(_) | AppError::Timeout { .. } => {
                "The service is temporarily unavailable, please try again".to_string()
            }
            AppError::PartialFailure { .. } => {
                "Your registration could not be completed cleanly. Please contact support."
                    .to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InsufficientInventory {
                requested,
                available,
            } => Some(json!({ "requested": requested, "available": available })),
            AppError::PartialFailure { claim_id, .. } => {
                Some(json!({ "reference": claim_id.to_string() }))
            }
            e if e.is_retryable() => Some(json!({ "retryable": true })),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::PaymentNotConfirmed(msg) => {
                warn!(error = ?self, message = %msg, "Request rejected");
            }
            AppError::InsufficientInventory { .. } | AppError::ConcurrencyExhausted { .. } => {
                warn!(error = %self, "Registration rejected");
            }
            AppError::StoreUnavailable(_) | AppError::Timeout { .. } => {
                warn!(error = %self, "Transient store failure");
            }
            AppError::PartialFailure {
                event_id,
                user_id,
                claim_id,
                tickets,
                reason,
            } => {
                error!(
                    %event_id,
                    %user_id,
                    %claim_id,
                    tickets,
                    %reason,
                    "Inventory and ledger diverged, manual reconciliation required"
                );
            }
            AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{} was not found", what)),
            StoreError::InsufficientInventory {
                requested,
                available,
            } => AppError::InsufficientInventory {
                requested,
                available,
            },
            StoreError::Validation(msg) => AppError::ValidationError(msg),
            StoreError::ConcurrencyExhausted { attempts } => {
                AppError::ConcurrencyExhausted { attempts }
            }
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            StoreError::TransactionsUnsupported | StoreError::Corrupt(_) => {
                AppError::InternalServerError(err.to_string())
            }
            StoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = self.public_message();
        let details = self.details();

        error_response(code, public_message, details, status)
    }
}
