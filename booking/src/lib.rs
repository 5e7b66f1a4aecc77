//! PG Stay booking service: booking lifecycle, aid sponsorship and payment
//! reconciliation for paying-guest accommodation.
//!
//! Tenants book a bed in a listing, optionally ask donors to sponsor part of
//! the rent, pay the remainder through a payment gateway and end up with a
//! confirmed booking. Owners manage listings, donors approve or decline aid
//! requests, administrators see everything. Anyone signed in may rate a
//! listing.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (axum)          BookingService            Store
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ api handlers │───▶│ commands + reads │───▶│  BookingReducer  │
//! └──────────────┘    └──────────────────┘    └──────────────────┘
//!                                                      │ effects
//!                                       ┌──────────────┴──────────────┐
//!                                       ▼                             ▼
//!                               PaymentGateway                    Notifier
//!                              (mock / Razorpay)              (confirmation)
//! ```
//!
//! Every state change goes through [`reducer::BookingReducer`], which runs
//! under the store's write lock: two donors approving the same request are
//! serialized and exactly one wins. Gateway calls run as effects whose
//! results come back as actions, so the lock is never held across I/O.
//!
//! # Booking lifecycle
//!
//! ```text
//!            ┌────────────── reject ─────────────┐
//!            ▼                                   │
//!   ──▶ Pending ── request aid ──▶ RequestingAid ── approve ──▶ ApprovedAid
//!         │                              │                          │
//!         └────────── pay ───────────────┼───────── pay ────────────┘
//!                                        ▼                          ▼
//!                                    Cancelled ◀── cancel ──── Confirmed
//! ```

#![forbid(unsafe_code)]

pub mod aid;
pub mod api;
pub mod authz;
pub mod config;
pub mod error;
pub mod machine;
pub mod notifier;
pub mod payment_gateway;
pub mod razorpay;
pub mod reducer;
pub mod server;
pub mod service;
pub mod sessions;
pub mod types;

pub use authz::{Permission, Session};
pub use config::Config;
pub use error::{BookingError, BookingResult};
pub use machine::{BookingEvent, transition};
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use payment_gateway::{MockPaymentGateway, PaymentConfirmation, PaymentGateway};
pub use razorpay::RazorpayGateway;
pub use reducer::{BookingAction, BookingEnvironment, BookingReducer, ListingUpdate, NewListing, Outcome};
pub use service::{AdminStats, BookingService, BookingStore, BookingView, ListingView, NewBooking};
pub use sessions::{InMemorySessions, SessionDirectory};
pub use types::{
    Account, Booking, BookingId, BookingState, BookingStatus, Listing, ListingId, Money, PaymentOrder,
    Review, ReviewId, Role, UserId,
};
