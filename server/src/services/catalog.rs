use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::payment::PaymentConfirmation;
use super::{retrying, WorkflowSettings};
use crate::models::event::EventTypeInfo;
use crate::models::{Event, EventCategory, EventDocument, EventFilter, EventPage, NewEvent, User};
use crate::store::EventCatalog;
use crate::utils::error::AppError;

/// What an organizer fills in when creating an event.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub category: EventCategory,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub ticket_count: u32,
    pub registration_fee: Decimal,
    /// Token chosen by the client for this creation attempt.
    pub idempotency_key: String,
}

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn EventCatalog>,
    settings: WorkflowSettings,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn EventCatalog>, settings: WorkflowSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn event_types(&self) -> Vec<EventTypeInfo> {
        EventCategory::ALL.into_iter().map(EventTypeInfo::from).collect()
    }

    /// Creates an event once its category's creation fee has been paid.
    ///
    /// Organizers need a phone number on file. Retrying with the same
    /// idempotency key returns the event created by the first attempt.
    #[tracing::instrument(skip(self, organizer, draft, payment), fields(organizer_id = %organizer.id, category = %draft.category))]
    pub async fn create_event(
        &self,
        organizer: &User,
        draft: EventDraft,
        payment: &PaymentConfirmation,
    ) -> Result<Event, AppError> {
        if organizer.verified_phone().is_none() {
            return Err(AppError::ValidationError(
                "Please provide your phone number before creating an event".to_string(),
            ));
        }
        if !payment.succeeded {
            return Err(AppError::PaymentNotConfirmed(
                "The creation fee has not been paid".to_string(),
            ));
        }
        let fee = draft.category.creation_fee();
        if payment.amount != fee {
            return Err(AppError::ValidationError(format!(
                "Creating a {} event costs {}",
                draft.category, fee
            )));
        }

        let new_event = NewEvent {
            category: draft.category,
            title: draft.title,
            description: draft.description,
            date: draft.date,
            time: draft.time,
            location: draft.location,
            ticket_count: draft.ticket_count,
            registration_fee: draft.registration_fee,
            organizer_id: organizer.id.clone(),
            organizer_name: organizer.display_name_or_anonymous().to_string(),
            image_url: draft.category.default_image().to_string(),
            idempotency_key: draft.idempotency_key,
        };
        new_event.validate().map_err(AppError::ValidationError)?;

        let id = retrying(&self.settings, "create_event", || {
            self.catalog.create_event(new_event.clone())
        })
        .await?;
        info!(event_id = %id, "Event created");

        self.get_event(id).await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Event, AppError> {
        retrying(&self.settings, "get_event", || self.catalog.get_event(id)).await
    }

    pub async fn list_events(&self, filter: &EventFilter) -> Result<EventPage, AppError> {
        retrying(&self.settings, "list_events", || self.catalog.list_events(filter)).await
    }

    /// Ingests historical event documents, normalizing legacy field names.
    /// Documents that do not describe a valid event are skipped.
    pub async fn import_documents(&self, documents: Vec<EventDocument>) -> Result<usize, AppError> {
        let mut imported = 0;
        for document in documents {
            let key = document.import_key();
            let new_event = match document.into_new_event() {
                Ok(new_event) => new_event,
                Err(reason) => {
                    warn!(%key, %reason, "Skipping unreadable event document");
                    continue;
                }
            };
            if let Err(reason) = new_event.validate() {
                warn!(%key, %reason, "Skipping invalid event document");
                continue;
            }
            retrying(&self.settings, "create_event", || {
                self.catalog.create_event(new_event.clone())
            })
            .await?;
            imported += 1;
        }
        Ok(imported)
    }

    /// Reads a JSON array of event documents and imports it.
    pub async fn import_file(&self, path: &Path) -> Result<usize, AppError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::InternalServerError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let documents: Vec<EventDocument> = serde_json::from_str(&raw).map_err(|e| {
            AppError::ValidationError(format!("{} is not a list of events: {}", path.display(), e))
        })?;
        let imported = self.import_documents(documents).await?;
        info!(path = %path.display(), imported, "Imported event documents");
        Ok(imported)
    }
}
