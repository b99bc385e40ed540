//! Access to the two document collections, `events` and `registrations`.
//!
//! [`EventCatalog`] owns events and is the authority on remaining inventory.
//! [`RegistrationLedger`] owns registrations and is the authority on how many
//! tickets each user holds. [`RegistrationStore`] is a backend offering both,
//! optionally able to commit a registration across the two collections in a
//! single transaction.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, EventCategory, EventFilter, EventPage, NewEvent, PageCursor};
use crate::models::{Registration, RegistrationUpsert};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Not enough tickets available. Requested: {requested}, Available: {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    #[error("{0}")]
    Validation(String),

    #[error("write conflict persisted after {attempts} attempts")]
    ConcurrencyExhausted { attempts: u32 },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("this store does not support multi-document transactions")]
    TransactionsUnsupported,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn event_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("Event '{}'", id))
    }
}

#[async_trait]
pub trait EventCatalog: Send + Sync {
    /// Persists a new event, or returns the id of the event already created
    /// by the same organizer with the same idempotency key.
    async fn create_event(&self, event: NewEvent) -> Result<Uuid, StoreError>;

    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError>;

    /// Decrements `ticket_count` by `amount` only if at least `amount` remain,
    /// adding `registrant` to the registrant set in the same write.
    async fn decrement_tickets(
        &self,
        id: Uuid,
        amount: u32,
        registrant: &str,
    ) -> Result<Event, StoreError>;

    /// Compensates a decrement made by a registration that could not be
    /// recorded. The registrant set is append-only and is left as it is.
    async fn restore_tickets(&self, id: Uuid, amount: u32) -> Result<Event, StoreError>;

    /// One page in `created_at DESC, id DESC` order, filtered by category only.
    async fn fetch_page(
        &self,
        category: Option<EventCategory>,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError>;

    async fn list_events_by_organizer(
        &self,
        organizer_id: &str,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError>;

    /// Fetches one page and narrows it in memory with the rest of the filter.
    /// A page can therefore hold fewer matches than requested while later
    /// pages still have some; callers follow `next_cursor`.
    async fn list_events(&self, filter: &EventFilter) -> Result<EventPage, StoreError> {
        let limit = filter.effective_page_size();
        let fetched = self
            .fetch_page(filter.category, filter.page_cursor, limit)
            .await?;

        let next_cursor = if fetched.len() as u32 == limit {
            fetched.last().map(|event| event.cursor().encode())
        } else {
            None
        };
        let events = fetched
            .into_iter()
            .filter(|event| filter.matches(event))
            .collect();

        Ok(EventPage {
            events,
            next_cursor,
        })
    }
}

#[async_trait]
pub trait RegistrationLedger: Send + Sync {
    async fn find_registration(
        &self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError>;

    /// Creates the (event, user) record or merges the delta into it.
    /// Idempotent on `upsert.claim_id`.
    async fn upsert_registration(
        &self,
        upsert: &RegistrationUpsert,
    ) -> Result<Registration, StoreError>;

    /// Most recent first, at most `limit` records.
    fn list_registrations_for_user<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxStream<'a, Result<Registration, StoreError>>;
}

#[async_trait]
pub trait RegistrationStore: EventCatalog + RegistrationLedger {
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Decrements inventory and upserts the ledger record as one transaction.
    /// Replaying an already committed claim returns the current state without
    /// writing.
    async fn commit_claim(
        &self,
        _claim: &RegistrationUpsert,
    ) -> Result<(Event, Registration), StoreError> {
        Err(StoreError::TransactionsUnsupported)
    }
}
