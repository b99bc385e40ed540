//! PostgreSQL backend.
//!
//! Inventory decrements are a single conditional `UPDATE ... WHERE
//! ticket_count >= $n`, ledger upserts rely on the `(event_id, user_id)`
//! unique constraint, and [`RegistrationStore::commit_claim`] runs both in
//! one transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{EventCatalog, RegistrationLedger, RegistrationStore, StoreError};
use crate::models::{Event, EventCategory, NewEvent, PageCursor, Registration, RegistrationUpsert};

const EVENT_COLUMNS: &str = "id, category, title, description, event_date, event_time, location, \
     ticket_count, registration_fee, organizer_id, organizer_name, image_url, registered_users, \
     idempotency_key, created_at";

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, tickets_bought, registered_at, updated_at, \
     payment_amount, payment_method, status, attendee_phone, applied_claims";

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    category: String,
    title: String,
    description: String,
    event_date: NaiveDate,
    event_time: NaiveTime,
    location: String,
    ticket_count: i32,
    registration_fee: Decimal,
    organizer_id: String,
    organizer_name: String,
    image_url: String,
    registered_users: Vec<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            category: row.category.parse().map_err(StoreError::Corrupt)?,
            title: row.title,
            description: row.description,
            date: row.event_date,
            time: row.event_time,
            location: row.location,
            ticket_count: u32::try_from(row.ticket_count).map_err(|_| {
                StoreError::Corrupt(format!("event {} has negative ticket count", row.id))
            })?,
            registration_fee: row.registration_fee,
            organizer_id: row.organizer_id,
            organizer_name: row.organizer_name,
            created_at: row.created_at,
            image_url: row.image_url,
            registered_users: row.registered_users,
            idempotency_key: row.idempotency_key,
        })
    }
}

#[derive(Debug, FromRow)]
struct RegistrationRow {
    id: Uuid,
    event_id: Uuid,
    user_id: String,
    tickets_bought: i32,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    payment_amount: Decimal,
    payment_method: String,
    status: String,
    attendee_phone: String,
    applied_claims: Vec<Uuid>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Registration {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            tickets_bought: u32::try_from(row.tickets_bought).map_err(|_| {
                StoreError::Corrupt(format!("registration {} has negative tickets", row.id))
            })?,
            registered_at: row.registered_at,
            updated_at: row.updated_at,
            payment_amount: row.payment_amount,
            payment_method: row.payment_method.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            attendee_phone: row.attendee_phone,
            applied_claims: row.applied_claims,
        })
    }
}

/// Maps connectivity failures to [`StoreError::Unavailable`]; everything else
/// stays a database error.
fn classify(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Validation(format!("{} is out of range", value)))
}

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn decrement_in(
    conn: &mut PgConnection,
    id: Uuid,
    amount: u32,
    registrant: &str,
) -> Result<Event, StoreError> {
    let sql = format!(
        "UPDATE events
         SET ticket_count = ticket_count - $2,
             registered_users = CASE WHEN $3 = ANY(registered_users)
                                     THEN registered_users
                                     ELSE array_append(registered_users, $3) END
         WHERE id = $1 AND ticket_count >= $2
         RETURNING {}",
        EVENT_COLUMNS
    );
    let updated: Option<EventRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(to_i32(amount)?)
        .bind(registrant)
        .fetch_optional(&mut *conn)
        .await
        .map_err(classify)?;

    if let Some(row) = updated {
        return row.try_into();
    }

    // Nothing matched: either the event is gone or there are too few tickets.
    let available: Option<i32> = sqlx::query_scalar("SELECT ticket_count FROM events WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(classify)?;
    match available {
        Some(available) => Err(StoreError::InsufficientInventory {
            requested: amount,
            available: u32::try_from(available).unwrap_or(0),
        }),
        None => Err(StoreError::event_not_found(id)),
    }
}

/// Returns `None` when the claim was already applied.
async fn upsert_in(
    conn: &mut PgConnection,
    upsert: &RegistrationUpsert,
) -> Result<Option<Registration>, StoreError> {
    let sql = format!(
        "INSERT INTO registrations
             (id, event_id, user_id, tickets_bought, registered_at, updated_at,
              payment_amount, payment_method, status, attendee_phone, applied_claims)
         VALUES ($1, $2, $3, $4, $5, $5, $6, $7, 'confirmed', $8, ARRAY[$9::uuid])
         ON CONFLICT (event_id, user_id) DO UPDATE SET
             tickets_bought = registrations.tickets_bought + EXCLUDED.tickets_bought,
             payment_amount = registrations.payment_amount + EXCLUDED.payment_amount,
             payment_method = EXCLUDED.payment_method,
             updated_at = EXCLUDED.updated_at,
             applied_claims = array_append(registrations.applied_claims, $9::uuid)
         WHERE NOT ($9::uuid = ANY(registrations.applied_claims))
         RETURNING {}",
        REGISTRATION_COLUMNS
    );
    let row: Option<RegistrationRow> = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(upsert.event_id)
        .bind(&upsert.user_id)
        .bind(to_i32(upsert.ticket_delta)?)
        .bind(Utc::now())
        .bind(upsert.payment_amount)
        .bind(upsert.payment_method.as_str())
        .bind(&upsert.attendee_phone)
        .bind(upsert.claim_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(classify)?;

    row.map(Registration::try_from).transpose()
}

async fn find_in(
    conn: &mut PgConnection,
    event_id: Uuid,
    user_id: &str,
) -> Result<Option<Registration>, StoreError> {
    let sql = format!(
        "SELECT {} FROM registrations WHERE event_id = $1 AND user_id = $2",
        REGISTRATION_COLUMNS
    );
    let row: Option<RegistrationRow> = sqlx::query_as(&sql)
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(classify)?;
    row.map(Registration::try_from).transpose()
}

async fn get_in(conn: &mut PgConnection, id: Uuid) -> Result<Event, StoreError> {
    let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
    let row: Option<EventRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(classify)?;
    row.ok_or_else(|| StoreError::event_not_found(id))?.try_into()
}

#[async_trait]
impl EventCatalog for PostgresStore {
    async fn create_event(&self, event: NewEvent) -> Result<Uuid, StoreError> {
        event.validate().map_err(StoreError::Validation)?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO events
                 (id, category, title, description, event_date, event_time, location,
                  ticket_count, registration_fee, organizer_id, organizer_name, image_url,
                  registered_users, idempotency_key, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, '{}', $13, NOW())
             ON CONFLICT (organizer_id, idempotency_key) DO NOTHING
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(event.category.as_str())
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.location)
        .bind(to_i32(event.ticket_count)?)
        .bind(event.registration_fee)
        .bind(&event.organizer_id)
        .bind(&event.organizer_name)
        .bind(&event.image_url)
        .bind(&event.idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        if let Some(id) = inserted {
            return Ok(id);
        }

        sqlx::query_scalar(
            "SELECT id FROM events WHERE organizer_id = $1 AND idempotency_key = $2",
        )
        .bind(&event.organizer_id)
        .bind(&event.idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        get_in(&mut conn, id).await
    }

    async fn decrement_tickets(
        &self,
        id: Uuid,
        amount: u32,
        registrant: &str,
    ) -> Result<Event, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        decrement_in(&mut conn, id, amount, registrant).await
    }

    async fn restore_tickets(&self, id: Uuid, amount: u32) -> Result<Event, StoreError> {
        let sql = format!(
            "UPDATE events SET ticket_count = ticket_count + $2 WHERE id = $1 RETURNING {}",
            EVENT_COLUMNS
        );
        let row: Option<EventRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(to_i32(amount)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.ok_or_else(|| StoreError::event_not_found(id))?.try_into()
    }

    async fn fetch_page(
        &self,
        category: Option<EventCategory>,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "SELECT {} FROM events
             WHERE ($1::text IS NULL OR category = $1::text)
               AND ($2::timestamptz IS NULL OR (created_at, id) < ($2::timestamptz, $3::uuid))
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
            EVENT_COLUMNS
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(category.map(|c| c.as_str()))
            .bind(after.map(|cursor| cursor.created_at))
            .bind(after.map(|cursor| cursor.id))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn list_events_by_organizer(
        &self,
        organizer_id: &str,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "SELECT {} FROM events WHERE organizer_id = $1 ORDER BY created_at DESC LIMIT $2",
            EVENT_COLUMNS
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(organizer_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        rows.into_iter().map(Event::try_from).collect()
    }
}

#[async_trait]
impl RegistrationLedger for PostgresStore {
    async fn find_registration(
        &self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        find_in(&mut conn, event_id, user_id).await
    }

    async fn upsert_registration(
        &self,
        upsert: &RegistrationUpsert,
    ) -> Result<Registration, StoreError> {
        upsert.validate().map_err(StoreError::Validation)?;

        let mut tx = self.pool.begin().await.map_err(classify)?;
        let registration = match upsert_in(&mut tx, upsert).await? {
            Some(registration) => registration,
            None => find_in(&mut tx, upsert.event_id, &upsert.user_id)
                .await?
                .ok_or_else(|| StoreError::NotFound("Registration".to_string()))?,
        };
        tx.commit().await.map_err(classify)?;
        Ok(registration)
    }

    fn list_registrations_for_user<'a>(
        &'a self,
        user_id: &'a str,
        limit: u32,
    ) -> BoxStream<'a, Result<Registration, StoreError>> {
        static SQL: std::sync::OnceLock<String> = std::sync::OnceLock::new();
        let sql = SQL.get_or_init(|| {
            format!(
                "SELECT {} FROM registrations WHERE user_id = $1 ORDER BY registered_at DESC LIMIT $2",
                REGISTRATION_COLUMNS
            )
        });

        sqlx::query_as::<_, RegistrationRow>(sql.as_str())
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch(&self.pool)
            .map(|row| row.map_err(classify).and_then(Registration::try_from))
            .boxed()
    }
}

#[async_trait]
impl RegistrationStore for PostgresStore {
    fn supports_transactions(&self) -> bool {
        true
    }

    async fn commit_claim(
        &self,
        claim: &RegistrationUpsert,
    ) -> Result<(Event, Registration), StoreError> {
        claim.validate().map_err(StoreError::Validation)?;

        let mut tx = self.pool.begin().await.map_err(classify)?;

        if let Some(existing) = find_in(&mut tx, claim.event_id, &claim.user_id).await? {
            if existing.has_applied(claim.claim_id) {
                let event = get_in(&mut tx, claim.event_id).await?;
                tx.commit().await.map_err(classify)?;
                return Ok((event, existing));
            }
        }

        let event = decrement_in(&mut tx, claim.event_id, claim.ticket_delta, &claim.user_id).await?;
        let registration = upsert_in(&mut tx, claim)
            .await?
            .ok_or_else(|| StoreError::Corrupt("claim applied twice in one transaction".to_string()))?;

        tx.commit().await.map_err(classify)?;
        Ok((event, registration))
    }
}
