//! Listing reviews.
//!
//! - `GET /api/listings/:id/reviews` - reviews of a listing, newest first
//! - `POST /api/listings/:id/reviews` - rate a listing (any signed-in role)

use super::error::AppError;
use super::extract::SessionUser;
use crate::server::state::AppState;
use crate::types::{ListingId, Review};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of a new review.
#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    /// Stars, 1 to 5
    pub rating: u32,
    /// Free text
    #[serde(default)]
    pub comment: Option<String>,
}

/// Reviews of a listing.
pub async fn list_reviews(
    SessionUser(_session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, AppError> {
    Ok(Json(state.service.list_reviews(ListingId::from_uuid(id)).await?))
}

/// Rate a listing.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/listings/<id>/reviews \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"rating": 4, "comment": "Clean rooms, slow wifi"}'
/// ```
pub async fn post_review(
    SessionUser(session): SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = state
        .service
        .post_review(&session, ListingId::from_uuid(id), body.rating, body.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}
