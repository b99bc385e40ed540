use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use super::identity::AuthenticatedUser;
use crate::services::history::DEFAULT_HISTORY_LIMIT;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const MAX_HISTORY_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

impl HistoryQuery {
    fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

pub async fn my_registrations(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    let events = state
        .history
        .registered_events(&user.id, query.limit())
        .await?;
    Ok(success(events, "Registered events retrieved"))
}

pub async fn my_events(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    let events = state
        .history
        .organized_events(&user.id, query.limit())
        .await?;
    Ok(success(events, "Organized events retrieved"))
}
