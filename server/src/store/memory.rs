//! In-process document store.
//!
//! Behaves like a remote document database: a read and the following write
//! are separate round trips, and event documents carry a version used for
//! compare-and-swap. Conflicting writers retry up to `max_cas_attempts`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{EventCatalog, RegistrationLedger, RegistrationStore, StoreError};
use crate::models::{Event, EventCategory, NewEvent, PageCursor, Registration, RegistrationUpsert};

pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
struct VersionedEvent {
    version: u64,
    event: Event,
}

type LedgerKey = (Uuid, String);

#[derive(Clone)]
pub struct InMemoryStore {
    events: Arc<RwLock<HashMap<Uuid, VersionedEvent>>>,
    registrations: Arc<Mutex<HashMap<LedgerKey, Registration>>>,
    max_cas_attempts: u32,
    transactional: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            registrations: Arc::new(Mutex::new(HashMap::new())),
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            transactional: false,
        }
    }

    pub fn with_max_cas_attempts(mut self, attempts: u32) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    /// Lets [`RegistrationStore::commit_claim`] take both collections at once.
    pub fn with_transactions(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    /// All ledger rows for one event.
    pub async fn registrations_for_event(&self, event_id: Uuid) -> Vec<Registration> {
        let registrations = self.registrations.lock().await;
        registrations
            .values()
            .filter(|registration| registration.event_id == event_id)
            .cloned()
            .collect()
    }

    async fn snapshot(&self, id: Uuid) -> Result<VersionedEvent, StoreError> {
        let events = self.events.read().await;
        events
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::event_not_found(id))
    }

    /// Writes `next` only if the stored version is still `expected`.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: u64,
        next: Event,
    ) -> Result<Option<Event>, StoreError> {
        let mut events = self.events.write().await;
        let current = events
            .get_mut(&id)
            .ok_or_else(|| StoreError::event_not_found(id))?;
        if current.version != expected {
            return Ok(None);
        }
        current.version += 1;
        current.event = next;
        Ok(Some(current.event.clone()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventCatalog for InMemoryStore {
    async fn create_event(&self, event: NewEvent) -> Result<Uuid, StoreError> {
        event.validate().map_err(StoreError::Validation)?;

        let mut events = self.events.write().await;
        let duplicate = events.values().find(|stored| {
            stored.event.organizer_id == event.organizer_id
                && stored.event.idempotency_key.as_deref() == Some(event.idempotency_key.as_str())
        });
        if let Some(existing) = duplicate {
            debug!(event_id = %existing.event.id, "Duplicate create request, returning existing event");
            return Ok(existing.event.id);
        }

        let id = Uuid::new_v4();
        // Microsecond precision keeps page cursors exact.
        let created_at = Utc::now().trunc_subsecs(6);
        events.insert(
            id,
            VersionedEvent {
                version: 0,
                event: event.into_event(id, created_at),
            },
        );
        Ok(id)
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError> {
        self.snapshot(id).await.map(|stored| stored.event)
    }

    async fn decrement_tickets(
        &self,
        id: Uuid,
        amount: u32,
        registrant: &str,
    ) -> Result<Event, StoreError> {
        for attempt in 1..=self.max_cas_attempts {
            let VersionedEvent { version, event } = self.snapshot(id).await?;
            if amount > event.ticket_count {
                return Err(StoreError::InsufficientInventory {
                    requested: amount,
                    available: event.ticket_count,
                });
            }

            let mut next = event;
            next.ticket_count -= amount;
            next.add_registrant(registrant);

            // Reads and writes are separate round trips on a document store.
            tokio::task::yield_now().await;

            if let Some(updated) = self.compare_and_swap(id, version, next).await? {
                return Ok(updated);
            }
            debug!(event_id = %id, attempt, "Version conflict on ticket decrement");
        }

        Err(StoreError::ConcurrencyExhausted {
            attempts: self.max_cas_attempts,
        })
    }

    async fn restore_tickets(&self, id: Uuid, amount: u32) -> Result<Event, StoreError> {
        let mut events = self.events.write().await;
        let stored = events
            .get_mut(&id)
            .ok_or_else(|| StoreError::event_not_found(id))?;
        stored.event.ticket_count += amount;
        stored.version += 1;
        Ok(stored.event.clone())
    }

    async fn fetch_page(
        &self,
        category: Option<EventCategory>,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().await;
        let mut page: Vec<Event> = events
            .values()
            .map(|stored| &stored.event)
            .filter(|event| category.map_or(true, |c| event.category == c))
            .filter(|event| after.map_or(true, |cursor| cursor.precedes(event)))
            .cloned()
            .collect();
        page.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn list_events_by_organizer(
        &self,
        organizer_id: &str,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().await;
        let mut owned: Vec<Event> = events
            .values()
            .filter(|stored| stored.event.organizer_id == organizer_id)
            .map(|stored| stored.event.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit as usize);
        Ok(owned)
    }
}

#[async_trait]
impl RegistrationLedger for InMemoryStore {
    async fn find_registration(
        &self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let registrations = self.registrations.lock().await;
        Ok(registrations
            .get(&(event_id, user_id.to_string()))
            .cloned())
    }

    async fn upsert_registration(
        &self,
        upsert: &RegistrationUpsert,
    ) -> Result<Registration, StoreError> {
        upsert.validate().map_err(StoreError::Validation)?;

        let mut registrations = self.registrations.lock().await;
        Ok(apply_upsert(&mut registrations, upsert))
    }

    fn list_registrations_for_user<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxStream<'a, Result<Registration, StoreError>> {
        let load = async move {
            let registrations = self.registrations.lock().await;
            let mut owned: Vec<Registration> = registrations
                .values()
                .filter(|registration| registration.user_id == user_id)
                .cloned()
                .collect();
            owned.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
            owned.truncate(limit as usize);
            stream::iter(owned.into_iter().map(Ok))
        };
        stream::once(load).flatten().boxed()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn commit_claim(
        &self,
        claim: &RegistrationUpsert,
    ) -> Result<(Event, Registration), StoreError> {
        if !self.transactional {
            return Err(StoreError::TransactionsUnsupported);
        }
        claim.validate().map_err(StoreError::Validation)?;

        // Lock order is always events, then registrations.
        let mut events = self.events.write().await;
        let mut registrations = self.registrations.lock().await;

        let stored = events
            .get_mut(&claim.event_id)
            .ok_or_else(|| StoreError::event_not_found(claim.event_id))?;

        let key = (claim.event_id, claim.user_id.clone());
        if let Some(existing) = registrations.get(&key) {
            if existing.has_applied(claim.claim_id) {
                return Ok((stored.event.clone(), existing.clone()));
            }
        }

        if claim.ticket_delta > stored.event.ticket_count {
            return Err(StoreError::InsufficientInventory {
                requested: claim.ticket_delta,
                available: stored.event.ticket_count,
            });
        }
        stored.event.ticket_count -= claim.ticket_delta;
        stored.event.add_registrant(&claim.user_id);
        stored.version += 1;

        let registration = apply_upsert(&mut registrations, claim);
        Ok((stored.event.clone(), registration))
    }
}

fn apply_upsert(
    registrations: &mut HashMap<LedgerKey, Registration>,
    upsert: &RegistrationUpsert,
) -> Registration {
    let now = Utc::now();
    let key = (upsert.event_id, upsert.user_id.clone());
    let registration = registrations
        .entry(key)
        .and_modify(|existing| existing.merge(upsert, now))
        .or_insert_with(|| Registration::create(upsert, now));
    registration.clone()
}
