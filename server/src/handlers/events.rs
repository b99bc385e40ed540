use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::identity::{header_text, AuthenticatedUser, IDEMPOTENCY_KEY_HEADER};
use crate::models::event::{parse_event_date, parse_event_time};
use crate::models::{EventCategory, EventFilter, PageCursor};
use crate::services::{EventDraft, PaymentDetails};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub category: Option<String>,
    pub date: Option<String>,
    pub min_fee: Option<Decimal>,
    pub max_fee: Option<Decimal>,
    #[serde(default)]
    pub only_available: bool,
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub page_size: Option<u32>,
}

impl TryFrom<ListEventsQuery> for EventFilter {
    type Error = AppError;

    fn try_from(query: ListEventsQuery) -> Result<Self, Self::Error> {
        let category = match query.category.as_deref().map(str::trim) {
            None | Some("") | Some("All") => None,
            Some(raw) => Some(raw.parse::<EventCategory>().map_err(AppError::ValidationError)?),
        };
        let exact_date = match query.date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_event_date(raw).map_err(AppError::ValidationError)?),
        };
        let page_cursor = match query.cursor.as_deref() {
            None | Some("") => None,
            Some(token) => Some(PageCursor::decode(token).map_err(AppError::ValidationError)?),
        };

        Ok(EventFilter {
            category,
            exact_date,
            min_fee: query.min_fee,
            max_fee: query.max_fee,
            only_available: query.only_available,
            search_text: query.search,
            page_cursor,
            page_size: query.page_size.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[serde(rename = "type")]
    pub category: EventCategory,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub ticket_count: u32,
    #[serde(default)]
    pub registration_fee: Decimal,
    pub payment: PaymentDetails,
    pub idempotency_key: Option<String>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Response, AppError> {
    let filter = EventFilter::try_from(query)?;
    let page = state.catalog.list_events(&filter).await?;
    Ok(success(page, "Events retrieved"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.catalog.get_event(event_id).await?;
    Ok(success(event, "Event retrieved"))
}

/// Charges the category's creation fee, then creates the event.
pub async fn create_event(
    State(state): State<AppState>,
    AuthenticatedUser(organizer): AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    let idempotency_key = body
        .idempotency_key
        .filter(|key| !key.trim().is_empty())
        .or_else(|| header_text(&headers, IDEMPOTENCY_KEY_HEADER))
        .ok_or_else(|| {
            AppError::ValidationError("An idempotency key is required to create an event".to_string())
        })?;

    let draft = EventDraft {
        category: body.category,
        title: body.title,
        description: body.description,
        date: parse_event_date(&body.date).map_err(AppError::ValidationError)?,
        time: parse_event_time(&body.time).map_err(AppError::ValidationError)?,
        location: body.location,
        ticket_count: body.ticket_count,
        registration_fee: body.registration_fee,
        idempotency_key,
    };
    if organizer.verified_phone().is_none() {
        return Err(AppError::ValidationError(
            "Please provide your phone number before creating an event".to_string(),
        ));
    }

    let payment = state
        .payments
        .confirm(draft.category.creation_fee(), &body.payment)
        .await?;
    let event = state.catalog.create_event(&organizer, draft, &payment).await?;

    Ok(created(event, "Event created successfully"))
}
