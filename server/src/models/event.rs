use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on the tickets a single event can offer.
pub const MAX_TICKET_COUNT: u32 = 500;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Wedding,
    #[serde(rename = "Business Meeting")]
    BusinessMeeting,
    Party,
    Conference,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::Wedding,
        EventCategory::BusinessMeeting,
        EventCategory::Party,
        EventCategory::Conference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Wedding => "Wedding",
            EventCategory::BusinessMeeting => "Business Meeting",
            EventCategory::Party => "Party",
            EventCategory::Conference => "Conference",
        }
    }

    /// Flat fee an organizer pays to list an event of this category.
    pub fn creation_fee(&self) -> Decimal {
        match self {
            EventCategory::Wedding => Decimal::from(5000),
            EventCategory::BusinessMeeting => Decimal::from(1500),
            EventCategory::Party => Decimal::from(3000),
            EventCategory::Conference => Decimal::from(7000),
        }
    }

    pub fn default_image(&self) -> &'static str {
        match self {
            EventCategory::Wedding => "https://images.unsplash.com/photo-1519741497674-611481863552?auto=format&fit=crop&q=80&w=1170",
            EventCategory::BusinessMeeting => "https://images.unsplash.com/photo-1600880292203-757bb62b4baf?auto=format&fit=crop&q=80&w=1170",
            EventCategory::Party => "https://images.unsplash.com/photo-1533174072545-7a4b6ad7a6c3?auto=format&fit=crop&q=80&w=1170",
            EventCategory::Conference => "https://images.unsplash.com/photo-1540575467063-178a50c2df87?auto=format&fit=crop&q=80&w=1170",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown event category '{}'", s))
    }
}

/// Catalog entry describing what it costs to create each kind of event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeInfo {
    #[serde(rename = "type")]
    pub category: EventCategory,
    pub price: Decimal,
    pub default_image: &'static str,
}

impl From<EventCategory> for EventTypeInfo {
    fn from(category: EventCategory) -> Self {
        Self {
            category,
            price: category.creation_fee(),
            default_image: category.default_image(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub category: EventCategory,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub ticket_count: u32,
    pub registration_fee: Decimal,
    pub organizer_id: String,
    pub organizer_name: String,
    pub created_at: DateTime<Utc>,
    pub image_url: String,
    pub registered_users: Vec<String>,
    #[serde(skip_serializing, default)]
    pub idempotency_key: Option<String>,
}

impl Event {
    pub fn is_free(&self) -> bool {
        self.registration_fee.is_zero()
    }

    pub fn has_registrant(&self, user_id: &str) -> bool {
        self.registered_users.iter().any(|id| id == user_id)
    }

    /// Adds a registrant; the set never holds duplicates.
    pub fn add_registrant(&mut self, user_id: &str) {
        if !self.has_registrant(user_id) {
            self.registered_users.push(user_id.to_string());
        }
    }

    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Event attributes supplied on creation; id and creation time come from the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub category: EventCategory,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub ticket_count: u32,
    pub registration_fee: Decimal,
    pub organizer_id: String,
    pub organizer_name: String,
    pub image_url: String,
    pub idempotency_key: String,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title is required".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("Description is required".to_string());
        }
        if self.location.trim().is_empty() {
            return Err("Location is required".to_string());
        }
        if self.organizer_id.trim().is_empty() {
            return Err("Organizer is required".to_string());
        }
        if self.idempotency_key.trim().is_empty() {
            return Err("An idempotency key is required to create an event".to_string());
        }
        if self.ticket_count < 1 {
            return Err("Ticket count must be at least 1".to_string());
        }
        if self.ticket_count > MAX_TICKET_COUNT {
            return Err(format!(
                "Ticket count cannot exceed {}",
                MAX_TICKET_COUNT
            ));
        }
        if self.registration_fee.is_sign_negative() {
            return Err("Registration fee cannot be negative".to_string());
        }
        Ok(())
    }

    pub fn into_event(self, id: Uuid, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            category: self.category,
            title: self.title,
            description: self.description,
            date: self.date,
            time: self.time,
            location: self.location,
            ticket_count: self.ticket_count,
            registration_fee: self.registration_fee,
            organizer_id: self.organizer_id,
            organizer_name: self.organizer_name,
            created_at,
            image_url: self.image_url,
            registered_users: Vec::new(),
            idempotency_key: Some(self.idempotency_key),
        }
    }
}

/// Accepts `YYYY-MM-DD` as well as full ISO timestamps, keeping only the date.
pub fn parse_event_date(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| format!("invalid event date '{}': {}", raw, e))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_event_time(raw: &str) -> Result<NaiveTime, String> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| format!("invalid event time '{}': {}", raw, e))
}

/// An event document as found in historical catalog data.
///
/// Older documents used `name`, `venue`, `price`, `startTime` and `createdBy`
/// in place of the canonical field names. Normalization to [`NewEvent`]
/// happens here and nowhere else.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub category: EventCategory,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    pub ticket_count: u32,
    #[serde(default)]
    pub registration_fee: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub organizer_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub organizer_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl EventDocument {
    /// Key used to dedupe repeated imports of the same document.
    pub fn import_key(&self) -> String {
        match &self.id {
            Some(id) => format!("import:{}", id),
            None => format!(
                "import:{}:{}",
                self.title.as_deref().or(self.name.as_deref()).unwrap_or_default(),
                self.date
            ),
        }
    }

    pub fn into_new_event(self) -> Result<NewEvent, String> {
        let idempotency_key = self.import_key();
        let date = parse_event_date(&self.date)?;
        let time = match self.time.or(self.start_time) {
            Some(raw) if !raw.trim().is_empty() => parse_event_time(&raw)?,
            _ => NaiveTime::MIN,
        };
        let image_url = self
            .image_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.category.default_image().to_string());

        Ok(NewEvent {
            category: self.category,
            title: self.title.or(self.name).unwrap_or_default(),
            description: self.description,
            date,
            time,
            location: self.location.or(self.venue).unwrap_or_default(),
            ticket_count: self.ticket_count,
            registration_fee: self
                .registration_fee
                .or(self.price)
                .unwrap_or(Decimal::ZERO),
            organizer_id: self.organizer_id.or(self.created_by).unwrap_or_default(),
            organizer_name: self.organizer_name.unwrap_or_default(),
            image_url,
            idempotency_key,
        })
    }
}

/// Position in the catalog's `created_at DESC, id DESC` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl PageCursor {
    pub fn encode(&self) -> String {
        format!("{}_{}", self.created_at.timestamp_micros(), self.id.simple())
    }

    pub fn decode(token: &str) -> Result<Self, String> {
        let invalid = || format!("invalid page cursor '{}'", token);
        let (micros, id) = token.split_once('_').ok_or_else(invalid)?;
        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(invalid)?;
        let id = Uuid::parse_str(id).map_err(|_| invalid())?;
        Ok(Self { created_at, id })
    }

    /// True when `event` sorts strictly after this cursor.
    pub fn precedes(&self, event: &Event) -> bool {
        (event.created_at, event.id) < (self.created_at, self.id)
    }
}

/// Browse options. Only `category` is evaluated by the store; every other
/// option narrows the page that was already fetched.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub category: Option<EventCategory>,
    pub exact_date: Option<NaiveDate>,
    pub min_fee: Option<Decimal>,
    pub max_fee: Option<Decimal>,
    pub only_available: bool,
    pub search_text: Option<String>,
    pub page_cursor: Option<PageCursor>,
    pub page_size: u32,
}

impl EventFilter {
    pub fn effective_page_size(&self) -> u32 {
        match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            size => size.min(MAX_PAGE_SIZE),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(date) = self.exact_date {
            if event.date != date {
                return false;
            }
        }
        if let Some(min) = self.min_fee {
            if event.registration_fee < min {
                return false;
            }
        }
        if let Some(max) = self.max_fee {
            if event.registration_fee > max {
                return false;
            }
        }
        if self.only_available && event.ticket_count == 0 {
            return false;
        }
        match self.search_text.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                event.title.to_lowercase().contains(&needle)
                    || event.description.to_lowercase().contains(&needle)
                    || event.location.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<Event>,
    /// Present whenever the fetched page was full, even if filtering emptied it.
    pub next_cursor: Option<String>,
}
