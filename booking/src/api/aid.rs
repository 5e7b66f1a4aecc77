//! Aid and sponsorship endpoints.
//!
//! - `GET /api/aid-requests` - bookings waiting for a donor (donors)
//! - `POST /api/aid-requests/:id/approve` - sponsor part of the rent
//! - `POST /api/aid-requests/:id/reject` - decline; the booking returns to pending
//! - `GET /api/sponsorships/:donor_id` - a donor's sponsorship history

use super::error::AppError;
use super::extract::{OptionalJson, SessionUser};
use crate::aid::SponsorshipView;
use crate::server::state::AppState;
use crate::service::BookingView;
use crate::types::{BookingId, UserId};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of an approval.
#[derive(Debug, Deserialize)]
pub struct ApproveAidBody {
    /// Percentage of the rent the donor covers (1..=100)
    pub percent: u32,
}

/// Body of a rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RejectAidBody {
    /// Shown in the booking's history
    #[serde(default)]
    pub note: Option<String>,
}

/// Bookings currently requesting aid.
pub async fn list_aid_requests(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(state.service.list_pending_aid_requests(&session).await?))
}

/// Approve an aid request.
///
/// When two donors approve the same request at once, one gets the updated
/// booking and the other `409 ALREADY_APPROVED`.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/aid-requests/<booking_id>/approve \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"percent": 20}'
/// ```
pub async fn approve_aid(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveAidBody>,
) -> Result<Json<BookingView>, AppError> {
    let view = state
        .service
        .approve_aid(&session, BookingId::from_uuid(id), body.percent)
        .await?;
    Ok(Json(view))
}

/// Reject an aid request.
pub async fn reject_aid(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    OptionalJson(body): OptionalJson<RejectAidBody>,
) -> Result<Json<BookingView>, AppError> {
    let view = state
        .service
        .reject_aid(&session, BookingId::from_uuid(id), body.note)
        .await?;
    Ok(Json(view))
}

/// A donor's sponsorships with the current status of each booking.
pub async fn sponsorship_history(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(donor_id): Path<Uuid>,
) -> Result<Json<Vec<SponsorshipView>>, AppError> {
    let history = state
        .service
        .list_sponsorship_history(&session, UserId::from_uuid(donor_id))
        .await?;
    Ok(Json(history))
}
