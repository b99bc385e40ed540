use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::models::User;
use crate::utils::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_PHONE_HEADER: &str = "x-user-phone";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// The caller as asserted by the identity provider sitting in front of the API.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let id = header_text(headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::AuthError("Please sign in to continue".to_string()))?;

        Ok(AuthenticatedUser(User {
            id,
            email: header_text(headers, USER_EMAIL_HEADER).unwrap_or_default(),
            display_name: header_text(headers, USER_NAME_HEADER),
            phone_number: header_text(headers, USER_PHONE_HEADER),
        }))
    }
}

pub(crate) fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
