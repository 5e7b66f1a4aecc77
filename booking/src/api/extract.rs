//! Request extractors: bearer token, authenticated session, correlation id,
//! optional JSON bodies.

use super::error::AppError;
use crate::authz::Session;
use crate::server::state::AppState;
use axum::{
    Json, async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{HeaderMap, StatusCode, request::Parts},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Header carrying the caller's correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Correlation id from `X-Correlation-ID`, or `None` when absent or not a UUID.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Bearer token extracted from `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'"))?;

        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token.to_string()))
    }
}

/// The authenticated caller.
///
/// Resolves the bearer token through the booking service; the role is read
/// from the live account.
#[derive(Debug, Clone, Copy)]
pub struct SessionUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let session = state.service.authenticate(&token).await?;
        tracing::debug!(user_id = %session.user_id, role = %session.role, "Authenticated request");
        Ok(Self(session))
    }
}

/// A JSON body that may be left out entirely.
///
/// An empty body yields `T::default()`. Anything else must be valid JSON for
/// `T`; a malformed body is rejected rather than treated as absent.
#[derive(Debug, Clone, Default)]
pub struct OptionalJson<T>(pub T);

fn invalid_body(status: StatusCode, message: String) -> AppError {
    AppError::new(status, message, "INVALID_INPUT".to_string())
}

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| invalid_body(rejection.status(), rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }

        let Json(value) = Json::<T>::from_bytes(&bytes)
            .map_err(|rejection| invalid_body(rejection.status(), rejection.body_text()))?;
        Ok(Self(value))
    }
}
