//! Router configuration.

use super::health::{health_check, metrics};
use super::state::AppState;
use crate::api::{admin, aid, bookings, extract, listings, reviews};
use axum::{
    Router,
    body::Body,
    http::Request,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router: `/health`, `/metrics` and the JSON API
/// under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/mine", get(bookings::list_my_bookings))
        .route(
            "/bookings/:id",
            get(bookings::get_booking).delete(bookings::delete_booking),
        )
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/bookings/:id/aid", post(bookings::request_aid))
        .route("/bookings/:id/payment-order", post(bookings::create_payment_order))
        .route("/bookings/:id/payment/verify", post(bookings::verify_payment))
        // Aid
        .route("/aid-requests", get(aid::list_aid_requests))
        .route("/aid-requests/:id/approve", post(aid::approve_aid))
        .route("/aid-requests/:id/reject", post(aid::reject_aid))
        .route("/sponsorships/:donor_id", get(aid::sponsorship_history))
        // Listings
        .route(
            "/listings",
            get(listings::browse_listings).post(listings::register_listing),
        )
        .route("/listings/managed", get(listings::managed_listings))
        .route(
            "/listings/:id",
            get(listings::get_listing)
                .put(listings::update_listing)
                .delete(listings::delete_listing),
        )
        .route(
            "/listings/:id/reviews",
            get(reviews::list_reviews).post(reviews::post_review),
        )
        .route("/owner/bookings", get(listings::owner_bookings))
        // Admin
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id", delete(admin::delete_user))
        .route("/admin/stats", get(admin::stats));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let correlation_id = extract::correlation_id(request.headers())
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    correlation_id = %correlation_id,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
