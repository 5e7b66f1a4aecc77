//! HTTP API handlers, organized by area:
//! - Bookings: lifecycle and payment
//! - Aid: donor approvals and sponsorship history
//! - Listings: browsing and owner management
//! - Reviews: ratings of listings
//! - Admin: accounts and statistics

pub mod admin;
pub mod aid;
pub mod bookings;
pub mod error;
pub mod extract;
pub mod listings;
pub mod reviews;

pub use error::AppError;
pub use extract::{BearerToken, SessionUser};
