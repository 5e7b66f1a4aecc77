//! Booking endpoints.
//!
//! - `POST /api/bookings` - book a bed (tenants)
//! - `GET /api/bookings/mine` - the caller's bookings
//! - `GET /api/bookings/:id` - one booking, if visible to the caller
//! - `DELETE /api/bookings/:id` - remove a booking record (admins)
//! - `POST /api/bookings/:id/cancel` - cancel
//! - `POST /api/bookings/:id/aid` - ask donors for aid
//! - `POST /api/bookings/:id/payment-order` - open a payment order
//! - `POST /api/bookings/:id/payment/verify` - confirm with the gateway's signature

use super::error::AppError;
use super::extract::{OptionalJson, SessionUser};
use crate::payment_gateway::PaymentConfirmation;
use crate::server::state::AppState;
use crate::service::{BookingView, NewBooking};
use crate::types::{BookingId, PaymentOrder};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of an aid request.
#[derive(Debug, Default, Deserialize)]
pub struct AidRequestBody {
    /// Why aid is needed
    #[serde(default)]
    pub reason: Option<String>,
    /// Discount hoped for
    #[serde(default)]
    pub requested_percent: Option<u32>,
}

/// Create a booking.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"listing_id": "…", "request_aid": true, "reason": "first job", "requested_percent": 30}'
/// ```
pub async fn create_booking(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Json(request): Json<NewBooking>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let view = state.service.create_booking(&session, request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// The caller's own bookings.
pub async fn list_my_bookings(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
) -> Json<Vec<BookingView>> {
    Json(state.service.list_my_bookings(&session).await)
}

/// One booking.
pub async fn get_booking(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    let view = state.service.get_booking(&session, BookingId::from_uuid(id)).await?;
    Ok(Json(view))
}

/// Delete a booking record.
pub async fn delete_booking(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_booking(&session, BookingId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a booking.
pub async fn cancel_booking(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    let view = state.service.cancel(&session, BookingId::from_uuid(id)).await?;
    Ok(Json(view))
}

/// Ask donors for aid on a pending booking.
pub async fn request_aid(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    OptionalJson(body): OptionalJson<AidRequestBody>,
) -> Result<Json<BookingView>, AppError> {
    let view = state
        .service
        .request_aid(&session, BookingId::from_uuid(id), body.reason, body.requested_percent)
        .await?;
    Ok(Json(view))
}

/// Open a payment order for the amount due.
///
/// A fully sponsored booking gets a local order with `sponsored: true`;
/// verifying it needs no gateway signature.
pub async fn create_payment_order(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<PaymentOrder>), AppError> {
    let order = state.service.create_order(&session, BookingId::from_uuid(id)).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Verify the gateway's payment confirmation and confirm the booking.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings/<id>/payment/verify \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"order_id": "order_…", "payment_id": "pay_…", "signature": "…"}'
/// ```
pub async fn verify_payment(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(confirmation): Json<PaymentConfirmation>,
) -> Result<Json<BookingView>, AppError> {
    let view = state
        .service
        .verify_and_confirm(&session, BookingId::from_uuid(id), confirmation)
        .await?;
    Ok(Json(view))
}
