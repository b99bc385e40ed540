#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use tokio::sync::Barrier;
use uuid::Uuid;

use eventhive_server::models::{
    Event, EventCategory, NewEvent, PageCursor, PaymentMethod, Registration, RegistrationUpsert,
    User,
};
use eventhive_server::services::{
    PaymentConfirmation, RegistrationRequest, RegistrationService, WorkflowSettings,
};
use eventhive_server::store::{
    EventCatalog, InMemoryStore, RegistrationLedger, RegistrationStore, StoreError,
};

pub fn fast_settings() -> WorkflowSettings {
    WorkflowSettings {
        store_timeout: Duration::from_millis(200),
        retry_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    }
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        display_name: Some(format!("User {}", id)),
        phone_number: Some("9876543210".to_string()),
    }
}

pub fn new_event(category: EventCategory, tickets: u32, fee: Decimal) -> NewEvent {
    NewEvent {
        category,
        title: format!("{} night", category),
        description: "An evening to remember".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 11, 20).unwrap(),
        time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        location: "Bengaluru".to_string(),
        ticket_count: tickets,
        registration_fee: fee,
        organizer_id: "organizer".to_string(),
        organizer_name: "Organizer".to_string(),
        image_url: category.default_image().to_string(),
        idempotency_key: Uuid::new_v4().to_string(),
    }
}

pub async fn seed_event<C: EventCatalog>(store: &C, tickets: u32, fee: Decimal) -> Uuid {
    store
        .create_event(new_event(EventCategory::Party, tickets, fee))
        .await
        .unwrap()
}

/// A confirmed payment covering `tickets` at `fee` each.
pub fn paid(fee: Decimal, tickets: u32) -> PaymentConfirmation {
    if fee.is_zero() {
        return PaymentConfirmation::free();
    }
    PaymentConfirmation {
        method: PaymentMethod::Card,
        amount: fee * Decimal::from(tickets),
        succeeded: true,
        reference: Uuid::new_v4(),
    }
}

pub fn request(event_id: Uuid, user_id: &str, tickets: u32, fee: Decimal) -> RegistrationRequest {
    RegistrationRequest {
        event_id,
        user: user(user_id),
        requested_tickets: tickets,
        payment: paid(fee, tickets),
    }
}

pub fn service<S: RegistrationStore + 'static>(store: Arc<S>) -> RegistrationService {
    RegistrationService::new(store, fast_settings())
}

/// Wraps the in-memory store and injects failures into chosen calls.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    /// Upserts that fail with `Unavailable` before one is let through.
    pub failing_upserts: Arc<AtomicU32>,
    /// Restores that fail with `Unavailable`.
    pub failing_restores: Arc<AtomicU32>,
    /// Delay added to every `get_event`.
    pub slow_reads: Option<Duration>,
    /// Upserts are applied, then the reply is held back this long.
    pub lagging_upserts: Option<Duration>,
    /// Upserts after this many calls fail with `Unavailable`.
    pub upserts_before_failure: Option<u32>,
    /// `find_registration` calls from this index on fail with `Unavailable`.
    pub finds_before_failure: Option<u32>,
    /// The first two `find_registration` calls wait for each other here.
    pub find_rendezvous: Option<Arc<Barrier>>,
    pub upsert_calls: Arc<AtomicU32>,
    pub decrement_calls: Arc<AtomicU32>,
    pub restore_calls: Arc<AtomicU32>,
    pub find_calls: Arc<AtomicU32>,
}

impl FaultyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_upserts(self, count: u32) -> Self {
        self.failing_upserts.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_restores(self, count: u32) -> Self {
        self.failing_restores.store(count, Ordering::SeqCst);
        self
    }

    pub fn slow_reads(mut self, delay: Duration) -> Self {
        self.slow_reads = Some(delay);
        self
    }

    pub fn lagging_upserts(mut self, delay: Duration) -> Self {
        self.lagging_upserts = Some(delay);
        self
    }

    pub fn fail_upserts_after(mut self, successes: u32) -> Self {
        self.upserts_before_failure = Some(successes);
        self
    }

    pub fn fail_finds_after(mut self, calls: u32) -> Self {
        self.finds_before_failure = Some(calls);
        self
    }

    pub fn pair_first_finds(mut self) -> Self {
        self.find_rendezvous = Some(Arc::new(Barrier::new(2)));
        self
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EventCatalog for FaultyStore {
    async fn create_event(&self, event: NewEvent) -> Result<Uuid, StoreError> {
        self.inner.create_event(event).await
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError> {
        if let Some(delay) = self.slow_reads {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_event(id).await
    }

    async fn decrement_tickets(
        &self,
        id: Uuid,
        amount: u32,
        registrant: &str,
    ) -> Result<Event, StoreError> {
        self.decrement_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decrement_tickets(id, amount, registrant).await
    }

    async fn restore_tickets(&self, id: Uuid, amount: u32) -> Result<Event, StoreError> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_restores) {
            return Err(StoreError::Unavailable("restore rejected".to_string()));
        }
        self.inner.restore_tickets(id, amount).await
    }

    async fn fetch_page(
        &self,
        category: Option<EventCategory>,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        self.inner.fetch_page(category, after, limit).await
    }

    async fn list_events_by_organizer(
        &self,
        organizer_id: &str,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        self.inner.list_events_by_organizer(organizer_id, limit).await
    }
}

#[async_trait]
impl RegistrationLedger for FaultyStore {
    async fn find_registration(
        &self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let call = self.find_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rendezvous) = &self.find_rendezvous {
            if call < 2 {
                rendezvous.wait().await;
            }
        }
        if self.finds_before_failure.is_some_and(|limit| call >= limit) {
            return Err(StoreError::Unavailable("ledger read rejected".to_string()));
        }
        self.inner.find_registration(event_id, user_id).await
    }

    async fn upsert_registration(
        &self,
        upsert: &RegistrationUpsert,
    ) -> Result<Registration, StoreError> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_upserts)
            || self.upserts_before_failure.is_some_and(|limit| call >= limit)
        {
            return Err(StoreError::Unavailable("ledger rejected".to_string()));
        }
        let registration = self.inner.upsert_registration(upsert).await?;
        if let Some(delay) = self.lagging_upserts {
            tokio::time::sleep(delay).await;
        }
        Ok(registration)
    }

    fn list_registrations_for_user<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxStream<'a, Result<Registration, StoreError>> {
        self.inner.list_registrations_for_user(user_id, limit)
    }
}

impl RegistrationStore for FaultyStore {}
