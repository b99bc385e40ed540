use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::{bounded, retrying, WorkflowSettings};
use crate::models::{Event, PaymentMethod};
use crate::store::RegistrationStore;
use crate::utils::error::AppError;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// An event the user holds tickets for, as shown on their history page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredEvent {
    pub event: Event,
    pub tickets_bought: u32,
    pub registration_date: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub payment_method: PaymentMethod,
}

#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn RegistrationStore>,
    settings: WorkflowSettings,
}

impl HistoryService {
    pub fn new(store: Arc<dyn RegistrationStore>, settings: WorkflowSettings) -> Self {
        Self { store, settings }
    }

    /// The user's registrations joined with current event snapshots, newest
    /// registration first. Registrations whose event is gone are left out.
    pub async fn registered_events(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<RegisteredEvent>, AppError> {
        let mut registrations = self.store.list_registrations_for_user(user_id, limit);
        let mut history = Vec::new();

        while let Some(next) = bounded(self.settings.store_timeout, "list_registrations", async {
            Ok(registrations.next().await)
        })
        .await?
        {
            let registration = next.map_err(AppError::from)?;
            let event = match retrying(&self.settings, "get_event", || {
                self.store.get_event(registration.event_id)
            })
            .await
            {
                Ok(event) => event,
                Err(AppError::NotFound(_)) => {
                    debug!(event_id = %registration.event_id, "Registered event no longer exists");
                    continue;
                }
                Err(e) => return Err(e),
            };

            history.push(RegisteredEvent {
                event,
                tickets_bought: registration.tickets_bought,
                registration_date: registration.registered_at,
                payment_amount: registration.payment_amount,
                payment_method: registration.payment_method,
            });
        }

        history.sort_by(|a, b| b.registration_date.cmp(&a.registration_date));
        Ok(history)
    }

    /// Events the user organizes, newest first.
    pub async fn organized_events(&self, user_id: &str, limit: u32) -> Result<Vec<Event>, AppError> {
        retrying(&self.settings, "list_events_by_organizer", || {
            self.store.list_events_by_organizer(user_id, limit)
        })
        .await
    }
}
