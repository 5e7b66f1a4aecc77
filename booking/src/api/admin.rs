//! Administrator endpoints.
//!
//! - `GET /api/admin/users` - every account
//! - `DELETE /api/admin/users/:id` - remove an account
//! - `GET /api/admin/stats` - platform statistics

use super::error::AppError;
use super::extract::SessionUser;
use crate::server::state::AppState;
use crate::service::AdminStats;
use crate::types::{Account, UserId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Every account, ordered by name.
pub async fn list_users(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.service.list_users(&session).await?))
}

/// Delete an account. Its bookings stay.
pub async fn delete_user(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_user(&session, UserId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Booking counts per status, revenue and sponsored totals.
pub async fn stats(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<AdminStats>, AppError> {
    Ok(Json(state.service.stats(&session).await?))
}
