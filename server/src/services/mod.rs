use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::store::StoreError;
use crate::utils::error::AppError;

pub mod catalog;
pub mod history;
pub mod payment;
pub mod registration;

pub use catalog::{CatalogService, EventDraft};
pub use history::{HistoryService, RegisteredEvent};
pub use payment::{PaymentConfirmation, PaymentDetails, SimulatedPaymentGateway};
pub use registration::{RegistrationReceipt, RegistrationRequest, RegistrationService};

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Attempts for reads and idempotent writes that fail transiently.
    pub retry_attempts: u32,
    /// Pause between those attempts.
    pub retry_backoff: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Runs one store call under `limit`; an elapsed limit becomes [`AppError::Timeout`].
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::Timeout {
            operation,
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Runs a read or an idempotent write, retrying transient failures.
pub(crate) async fn retrying<T, F, Fut>(
    settings: &WorkflowSettings,
    operation: &'static str,
    mut call: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match bounded(settings.store_timeout, operation, call()).await {
            Err(e) if e.is_retryable() && attempt < settings.retry_attempts => {
                warn!(operation, attempt, error = %e, "Retrying store call");
                attempt += 1;
                tokio::time::sleep(settings.retry_backoff).await;
            }
            result => return result,
        }
    }
}
