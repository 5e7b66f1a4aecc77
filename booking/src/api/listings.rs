//! Listing endpoints.
//!
//! - `GET /api/listings?city=` - browse listings (any authenticated caller)
//! - `POST /api/listings` - register a listing (owners, admins)
//! - `GET /api/listings/managed` - listings the caller manages
//! - `GET /api/listings/:id` - one listing with occupancy and rating
//! - `PUT /api/listings/:id` - change a listing (its owner, admins)
//! - `DELETE /api/listings/:id` - remove a listing
//! - `GET /api/owner/bookings` - bookings on the caller's listings

use super::error::AppError;
use super::extract::SessionUser;
use crate::reducer::{ListingUpdate, NewListing};
use crate::server::state::AppState;
use crate::service::{BookingView, ListingView};
use crate::types::{Listing, ListingId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Query parameters for browsing.
#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    /// Only listings in this city (case-insensitive)
    pub city: Option<String>,
}

/// Browse listings.
pub async fn browse_listings(
    SessionUser(_session): SessionUser,
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> Json<Vec<Listing>> {
    let city = query.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    Json(state.service.browse_listings(city).await)
}

/// Register a listing. Rent is given in paise.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/listings \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"name": "Sunrise PG", "city": "Pune", "rent": 900000, "capacity": 4}'
/// ```
pub async fn register_listing(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Json(listing): Json<NewListing>,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let listing = state.service.register_listing(&session, listing).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// Listings the caller owns (all of them for admins).
pub async fn managed_listings(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(state.service.list_managed_listings(&session).await?))
}

/// One listing with its free beds and average rating.
pub async fn get_listing(
    SessionUser(_session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingView>, AppError> {
    Ok(Json(state.service.get_listing(ListingId::from_uuid(id)).await?))
}

/// Change a listing. Only the fields present are updated.
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/listings/<id> \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"rent": 950000}'
/// ```
pub async fn update_listing(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<ListingUpdate>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(state.service.update_listing(&session, ListingId::from_uuid(id), changes).await?))
}

/// Delete a listing.
pub async fn delete_listing(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_listing(&session, ListingId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bookings on the caller's listings.
pub async fn owner_bookings(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(state.service.owner_bookings(&session).await?))
}
