//! The booking reducer.
//!
//! Every write to [`BookingState`] goes through [`BookingReducer`]. The store
//! runs it under a single write lock, so each command is validated and
//! applied atomically; two donors approving the same request are simply
//! reduced one after the other and the second sees `ApprovedAid`.
//!
//! Commands carry a correlation id and finish with exactly one reply action,
//! [`BookingAction::Completed`] or [`BookingAction::Rejected`], emitted as an
//! effect so that it is broadcast to the caller waiting on the store.
//! Gateway calls run as effects too and come back as events.

use crate::aid;
use crate::authz::{Permission, Session, authorize};
use crate::error::BookingError;
use crate::machine::{BookingEvent, transition, validate_percent};
use crate::notifier::{ConfirmationNotice, Notifier};
use crate::payment_gateway::{GatewayError, GatewayOrder, PaymentConfirmation, PaymentGateway};
use crate::types::{
    Account, AidRequest, Booking, BookingId, BookingState, BookingStatus, Listing, ListingId, Money,
    PaymentOrder, PaymentReceipt, Review, ReviewId, Role, SponsorshipRecord, UserId,
};
use pgstay_core::environment::Clock;
use pgstay_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

// ============================================================================
// Actions (Commands + Events + Replies)
// ============================================================================

/// Listing data supplied when registering a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    /// Owning account; defaults to the acting session
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Display name
    pub name: String,
    /// City
    pub city: String,
    /// Monthly rent
    pub rent: Money,
    /// Beds
    pub capacity: u32,
}

/// Listing fields an owner may change. Absent fields are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingUpdate {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// City
    #[serde(default)]
    pub city: Option<String>,
    /// Monthly rent for bookings made from now on
    #[serde(default)]
    pub rent: Option<Money>,
    /// Beds
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// Longest review comment accepted, in characters.
pub const MAX_REVIEW_COMMENT: usize = 2000;

/// What a successful command produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The booking after the command
    Booking(Box<Booking>),
    /// An order ready for checkout
    Order(PaymentOrder),
    /// A registered listing
    Listing(Listing),
    /// A registered account
    Account(Account),
    /// A posted review
    Review(Review),
    /// Something was removed
    Deleted,
}

/// Actions for the booking reducer
#[derive(Clone, Debug)]
pub enum BookingAction {
    // Commands
    /// Create or replace an account (seeded from the sessions file)
    RegisterAccount {
        /// Reply key
        correlation_id: Uuid,
        /// Account to store
        account: Account,
    },

    /// Remove an account; its bookings stay
    DeleteAccount {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Account to remove
        user_id: UserId,
    },

    /// Register a listing
    RegisterListing {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// New listing id
        listing_id: ListingId,
        /// Listing data
        listing: NewListing,
    },

    /// Change a listing; existing bookings keep the rent they were booked at
    UpdateListing {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Listing to change
        listing_id: ListingId,
        /// Fields to change
        changes: ListingUpdate,
    },

    /// Rate a listing
    PostReview {
        /// Reply key
        correlation_id: Uuid,
        /// Author
        session: Session,
        /// New review id
        review_id: ReviewId,
        /// Listing reviewed
        listing_id: ListingId,
        /// Stars, 1 to 5
        rating: u32,
        /// Free text
        comment: Option<String>,
    },

    /// Remove a listing and its reviews; its bookings stay
    DeleteListing {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Listing to remove
        listing_id: ListingId,
    },

    /// Book a bed, optionally asking for aid immediately
    CreateBooking {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// New booking id
        booking_id: BookingId,
        /// Listing to book
        listing_id: ListingId,
        /// Start in `RequestingAid`
        request_aid: bool,
        /// Why aid is needed
        reason: Option<String>,
        /// Discount hoped for
        requested_percent: Option<u32>,
    },

    /// Ask donors for aid on a pending booking
    RequestAid {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Booking
        booking_id: BookingId,
        /// Why aid is needed
        reason: Option<String>,
        /// Discount hoped for
        requested_percent: Option<u32>,
    },

    /// Donor sponsors `percent`% of the rent
    ApproveAid {
        /// Reply key
        correlation_id: Uuid,
        /// Acting donor
        session: Session,
        /// Booking
        booking_id: BookingId,
        /// Approved discount
        percent: u32,
    },

    /// Donor declines the request; the booking returns to `Pending`
    RejectAid {
        /// Reply key
        correlation_id: Uuid,
        /// Acting donor
        session: Session,
        /// Booking
        booking_id: BookingId,
        /// Optional explanation kept in the history
        note: Option<String>,
    },

    /// Open a payment order for the amount due
    CreatePaymentOrder {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Booking
        booking_id: BookingId,
    },

    /// Confirm the booking with the checkout widget's confirmation
    VerifyPayment {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Booking
        booking_id: BookingId,
        /// Gateway confirmation
        confirmation: PaymentConfirmation,
    },

    /// Cancel a booking
    CancelBooking {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Booking
        booking_id: BookingId,
    },

    /// Remove a booking record (the sponsorship ledger keeps its entry)
    DeleteBooking {
        /// Reply key
        correlation_id: Uuid,
        /// Acting session
        session: Session,
        /// Booking
        booking_id: BookingId,
    },

    // Events
    /// The gateway opened an order
    PaymentOrderOpened {
        /// Reply key
        correlation_id: Uuid,
        /// Session that asked for the order
        session: Session,
        /// Booking
        booking_id: BookingId,
        /// Gateway order
        order: GatewayOrder,
    },

    /// The gateway refused to open an order
    PaymentOrderFailed {
        /// Reply key
        correlation_id: Uuid,
        /// Booking
        booking_id: BookingId,
        /// Gateway error
        error: GatewayError,
    },

    /// The gateway vouched for a payment confirmation
    PaymentVerified {
        /// Reply key
        correlation_id: Uuid,
        /// Session that submitted the confirmation
        session: Session,
        /// Booking
        booking_id: BookingId,
        /// Verified confirmation
        confirmation: PaymentConfirmation,
    },

    /// The gateway did not vouch for a payment confirmation
    PaymentVerificationRejected {
        /// Reply key
        correlation_id: Uuid,
        /// Booking
        booking_id: BookingId,
        /// Gateway error
        error: GatewayError,
    },

    // Replies
    /// The command with `correlation_id` succeeded
    Completed {
        /// Reply key
        correlation_id: Uuid,
        /// Result
        outcome: Outcome,
    },

    /// The command with `correlation_id` failed
    Rejected {
        /// Reply key
        correlation_id: Uuid,
        /// Why
        error: BookingError,
    },
}

impl BookingAction {
    /// The correlation id every action carries
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        match self {
            Self::RegisterAccount { correlation_id, .. }
            | Self::DeleteAccount { correlation_id, .. }
            | Self::RegisterListing { correlation_id, .. }
            | Self::UpdateListing { correlation_id, .. }
            | Self::PostReview { correlation_id, .. }
            | Self::DeleteListing { correlation_id, .. }
            | Self::CreateBooking { correlation_id, .. }
            | Self::RequestAid { correlation_id, .. }
            | Self::ApproveAid { correlation_id, .. }
            | Self::RejectAid { correlation_id, .. }
            | Self::CreatePaymentOrder { correlation_id, .. }
            | Self::VerifyPayment { correlation_id, .. }
            | Self::CancelBooking { correlation_id, .. }
            | Self::DeleteBooking { correlation_id, .. }
            | Self::PaymentOrderOpened { correlation_id, .. }
            | Self::PaymentOrderFailed { correlation_id, .. }
            | Self::PaymentVerified { correlation_id, .. }
            | Self::PaymentVerificationRejected { correlation_id, .. }
            | Self::Completed { correlation_id, .. }
            | Self::Rejected { correlation_id, .. } => *correlation_id,
        }
    }

    /// Whether this is the final answer to a command
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Rejected { .. })
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the booking reducer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Payment gateway
    pub gateway: Arc<dyn PaymentGateway>,
    /// Confirmation notices
    pub notifier: Arc<dyn Notifier>,
    /// Currency for gateway orders
    pub currency: String,
}

impl BookingEnvironment {
    /// Environment charging in INR
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            gateway,
            notifier,
            currency: "INR".to_string(),
        }
    }

    /// Charge in `currency` instead
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for accounts, listings and the booking lifecycle
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

/// How a payment confirmation relates to the booking's current state.
enum Settlement {
    /// Already confirmed by this very payment
    AlreadySettled(Box<Booking>),
    /// Payable through `order`
    Due(PaymentOrder),
}

fn reply(correlation_id: Uuid, outcome: Outcome) -> Effect<BookingAction> {
    async_effect! { Some(BookingAction::Completed { correlation_id, outcome }) }
}

fn booking_reply(correlation_id: Uuid, booking: &Booking) -> Effects {
    smallvec![reply(correlation_id, Outcome::Booking(Box::new(booking.clone())))]
}

fn booking_mut<'a>(
    state: &'a mut BookingState,
    booking_id: &BookingId,
) -> Result<&'a mut Booking, BookingError> {
    state
        .bookings
        .get_mut(booking_id)
        .ok_or_else(|| BookingError::not_found("booking", booking_id))
}

fn non_empty(value: &str, field: &str) -> Result<(), BookingError> {
    if value.trim().is_empty() {
        return Err(BookingError::invalid_input(format!("{field} must not be empty")));
    }
    Ok(())
}

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn rejected(correlation_id: Uuid, error: BookingError) -> Effects {
        tracing::warn!(%correlation_id, code = error.code(), %error, "Command rejected");
        metrics::counter!("bookings.rejected", "code" => error.code()).increment(1);

        smallvec![async_effect! {
            Some(BookingAction::Rejected { correlation_id, error })
        }]
    }

    // ========== Accounts & listings ==========

    fn register_account(correlation_id: Uuid, state: &mut BookingState, account: Account) -> Result<Effects, BookingError> {
        non_empty(&account.name, "name")?;
        non_empty(&account.email, "email")?;

        tracing::info!(user_id = %account.id, role = %account.role, "Account registered");
        state.accounts.insert(account.id, account.clone());
        Ok(smallvec![reply(correlation_id, Outcome::Account(account))])
    }

    fn delete_account(
        correlation_id: Uuid,
        state: &mut BookingState,
        session: &Session,
        user_id: UserId,
    ) -> Result<Effects, BookingError> {
        authorize(session, Permission::ManageUsers, None)?;
        if user_id == session.user_id {
            return Err(BookingError::invalid_input("an administrator cannot delete their own account"));
        }
        state
            .accounts
            .remove(&user_id)
            .ok_or_else(|| BookingError::not_found("user", user_id))?;

        tracing::info!(%user_id, by = %session.user_id, "Account deleted");
        Ok(smallvec![reply(correlation_id, Outcome::Deleted)])
    }

    fn register_listing(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        listing_id: ListingId,
        draft: NewListing,
    ) -> Result<Effects, BookingError> {
        let owner_id = draft.owner_id.unwrap_or(session.user_id);
        authorize(session, Permission::ManageListings, Some(owner_id))?;

        let owner = state
            .account(&owner_id)
            .ok_or_else(|| BookingError::not_found("user", owner_id))?;
        if owner.role != Role::Owner {
            return Err(BookingError::invalid_input(format!(
                "listing owner must be an OWNER account, not {}",
                owner.role
            )));
        }
        non_empty(&draft.name, "name")?;
        non_empty(&draft.city, "city")?;
        if draft.rent.is_zero() {
            return Err(BookingError::invalid_input("rent must be greater than zero"));
        }
        if draft.capacity == 0 {
            return Err(BookingError::invalid_input("capacity must be at least one bed"));
        }
        if state.listings.contains_key(&listing_id) {
            return Err(BookingError::invalid_input(format!("listing {listing_id} already exists")));
        }

        let listing = Listing {
            id: listing_id,
            owner_id,
            name: draft.name.trim().to_string(),
            city: draft.city.trim().to_string(),
            rent: draft.rent,
            capacity: draft.capacity,
            created_at: env.clock.now(),
        };
        tracing::info!(%listing_id, %owner_id, rent = %listing.rent, "Listing registered");
        metrics::counter!("listings.registered").increment(1);
        state.listings.insert(listing_id, listing.clone());

        Ok(smallvec![reply(correlation_id, Outcome::Listing(listing))])
    }

    fn update_listing(
        correlation_id: Uuid,
        state: &mut BookingState,
        session: &Session,
        listing_id: ListingId,
        changes: ListingUpdate,
    ) -> Result<Effects, BookingError> {
        let occupied = state.occupied_beds(&listing_id);
        let listing = state
            .listings
            .get_mut(&listing_id)
            .ok_or_else(|| BookingError::not_found("listing", listing_id))?;
        authorize(session, Permission::ManageListings, Some(listing.owner_id))?;

        if let Some(name) = &changes.name {
            non_empty(name, "name")?;
        }
        if let Some(city) = &changes.city {
            non_empty(city, "city")?;
        }
        if changes.rent.is_some_and(|rent| rent.is_zero()) {
            return Err(BookingError::invalid_input("rent must be greater than zero"));
        }
        if let Some(capacity) = changes.capacity {
            if capacity == 0 {
                return Err(BookingError::invalid_input("capacity must be at least one bed"));
            }
            if (capacity as usize) < occupied {
                return Err(BookingError::invalid_input(format!(
                    "capacity {capacity} is below the {occupied} beds already booked"
                )));
            }
        }

        if let Some(name) = changes.name {
            listing.name = name.trim().to_string();
        }
        if let Some(city) = changes.city {
            listing.city = city.trim().to_string();
        }
        if let Some(rent) = changes.rent {
            listing.rent = rent;
        }
        if let Some(capacity) = changes.capacity {
            listing.capacity = capacity;
        }

        tracing::info!(%listing_id, by = %session.user_id, rent = %listing.rent, "Listing updated");
        Ok(smallvec![reply(correlation_id, Outcome::Listing(listing.clone()))])
    }

    #[allow(clippy::too_many_arguments)]
    fn post_review(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        review_id: ReviewId,
        listing_id: ListingId,
        rating: u32,
        comment: Option<String>,
    ) -> Result<Effects, BookingError> {
        if state.listing(&listing_id).is_none() {
            return Err(BookingError::not_found("listing", listing_id));
        }
        let rating = match u8::try_from(rating) {
            Ok(stars @ 1..=5) => stars,
            _ => return Err(BookingError::invalid_input(format!("rating must be between 1 and 5, got {rating}"))),
        };
        let comment = comment.as_deref().map(str::trim).unwrap_or_default().to_string();
        if comment.chars().count() > MAX_REVIEW_COMMENT {
            return Err(BookingError::invalid_input(format!(
                "comment must be at most {MAX_REVIEW_COMMENT} characters"
            )));
        }
        if state.reviews.iter().any(|r| r.id == review_id) {
            return Err(BookingError::invalid_input(format!("review {review_id} already exists")));
        }

        let review = Review {
            id: review_id,
            listing_id,
            user_id: session.user_id,
            rating,
            comment,
            created_at: env.clock.now(),
        };
        tracing::info!(%review_id, %listing_id, user_id = %session.user_id, rating, "Review posted");
        metrics::counter!("reviews.posted").increment(1);
        state.reviews.push(review.clone());

        Ok(smallvec![reply(correlation_id, Outcome::Review(review))])
    }

    fn delete_listing(
        correlation_id: Uuid,
        state: &mut BookingState,
        session: &Session,
        listing_id: ListingId,
    ) -> Result<Effects, BookingError> {
        let owner_id = state
            .listing(&listing_id)
            .map(|l| l.owner_id)
            .ok_or_else(|| BookingError::not_found("listing", listing_id))?;
        authorize(session, Permission::ManageListings, Some(owner_id))?;

        state.listings.remove(&listing_id);
        state.reviews.retain(|r| r.listing_id != listing_id);
        tracing::info!(%listing_id, by = %session.user_id, "Listing deleted");
        Ok(smallvec![reply(correlation_id, Outcome::Deleted)])
    }

    // ========== Booking lifecycle ==========

    #[allow(clippy::too_many_arguments)]
    fn create_booking(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        listing_id: ListingId,
        request_aid: bool,
        reason: Option<String>,
        requested_percent: Option<u32>,
    ) -> Result<Effects, BookingError> {
        authorize(session, Permission::CreateBooking, Some(session.user_id))?;

        let listing = state
            .listing(&listing_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("listing", listing_id))?;
        let requested_percent = match requested_percent {
            Some(percent) if request_aid => Some(validate_percent(percent)?),
            _ => None,
        };
        if state.occupied_beds(&listing_id) >= listing.capacity as usize {
            return Err(BookingError::CapacityExceeded {
                listing_id,
                capacity: listing.capacity,
            });
        }

        let existing = state.booking(&booking_id).map(|b| b.status);
        let status = transition(existing, BookingEvent::Create { request_aid }, session.role)?;

        let mut booking = Booking::new(booking_id, session.user_id, &listing, status, env.clock.now());
        if request_aid {
            booking.aid_request = Some(AidRequest {
                reason,
                requested_percent,
                approved_percent: None,
            });
        }

        tracing::info!(%booking_id, %listing_id, user_id = %session.user_id, %status, "Booking created");
        metrics::counter!("bookings.created", "status" => status.to_string()).increment(1);

        let effects = booking_reply(correlation_id, &booking);
        state.bookings.insert(booking_id, booking);
        Ok(effects)
    }

    fn request_aid(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        reason: Option<String>,
        requested_percent: Option<u32>,
    ) -> Result<Effects, BookingError> {
        let booking = booking_mut(state, &booking_id)?;
        authorize(session, Permission::RequestAid, Some(booking.user_id))?;
        let status = transition(Some(booking.status), BookingEvent::RequestAid, session.role)?;
        let requested_percent = requested_percent.map(validate_percent).transpose()?;

        booking.aid_request = Some(AidRequest {
            reason,
            requested_percent,
            approved_percent: None,
        });
        booking.record_transition(status, session.user_id, env.clock.now(), None);

        tracing::info!(%booking_id, "Aid requested");
        metrics::counter!("aid.requested").increment(1);
        Ok(booking_reply(correlation_id, booking))
    }

    fn approve_aid(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        percent: u32,
    ) -> Result<Effects, BookingError> {
        authorize(session, Permission::DecideAid, None)?;

        let now = env.clock.now();
        let booking = booking_mut(state, &booking_id)?;
        aid::ensure_sponsorable(booking)?;
        let status = transition(Some(booking.status), BookingEvent::ApproveAid { percent }, session.role)?;
        let percent = validate_percent(percent)?;

        let (covered, remainder) = aid::discount(booking.base_amount, percent);
        booking.discount_percent = percent;
        booking.donor_id = Some(session.user_id);
        booking.final_amount = remainder;
        booking
            .aid_request
            .get_or_insert_with(AidRequest::default)
            .approved_percent = Some(percent);
        booking.record_transition(status, session.user_id, now, Some(format!("{percent}% sponsored")));

        let record = SponsorshipRecord {
            booking_id,
            donor_id: session.user_id,
            user_id: booking.user_id,
            listing_id: booking.listing_id,
            percent,
            amount: covered,
            approved_at: now,
        };
        let effects = booking_reply(correlation_id, booking);
        state.sponsorships.push(record);
        state.close_orders(&booking_id);

        tracing::info!(%booking_id, donor_id = %session.user_id, percent, amount = %covered, "Aid approved");
        metrics::counter!("aid.approved").increment(1);
        Ok(effects)
    }

    fn reject_aid(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        note: Option<String>,
    ) -> Result<Effects, BookingError> {
        authorize(session, Permission::DecideAid, None)?;

        let booking = booking_mut(state, &booking_id)?;
        let status = transition(Some(booking.status), BookingEvent::RejectAid, session.role)?;

        booking.aid_request = None;
        let note = note.unwrap_or_else(|| "aid request declined".to_string());
        booking.record_transition(status, session.user_id, env.clock.now(), Some(note));

        tracing::info!(%booking_id, donor_id = %session.user_id, "Aid rejected");
        metrics::counter!("aid.rejected").increment(1);
        Ok(booking_reply(correlation_id, booking))
    }

    fn cancel_booking(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
    ) -> Result<Effects, BookingError> {
        let booking = booking_mut(state, &booking_id)?;
        authorize(session, Permission::CancelBooking, Some(booking.user_id))?;
        let previous = booking.status;
        let status = transition(Some(previous), BookingEvent::Cancel, session.role)?;

        booking.record_transition(status, session.user_id, env.clock.now(), None);
        let effects = booking_reply(correlation_id, booking);
        state.close_orders(&booking_id);

        tracing::info!(%booking_id, %previous, by = %session.user_id, "Booking cancelled");
        metrics::counter!("bookings.cancelled").increment(1);
        Ok(effects)
    }

    fn delete_booking(
        correlation_id: Uuid,
        state: &mut BookingState,
        session: &Session,
        booking_id: BookingId,
    ) -> Result<Effects, BookingError> {
        authorize(session, Permission::DeleteBooking, None)?;
        state
            .bookings
            .remove(&booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        state.close_orders(&booking_id);

        tracing::info!(%booking_id, by = %session.user_id, "Booking deleted");
        Ok(smallvec![reply(correlation_id, Outcome::Deleted)])
    }

    // ========== Payment reconciliation ==========

    fn create_payment_order(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: Session,
        booking_id: BookingId,
    ) -> Result<Effects, BookingError> {
        let booking = state
            .booking(&booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        authorize(&session, Permission::Pay, Some(booking.user_id))?;
        transition(Some(booking.status), BookingEvent::Pay, session.role)?;

        let amount = booking.final_amount;
        let receipt = format!("order_rcptid_{booking_id}");

        if amount.is_zero() {
            let order = PaymentOrder {
                order_id: format!("sponsored_{booking_id}"),
                booking_id,
                amount,
                currency: env.currency.clone(),
                receipt,
                sponsored: true,
                created_at: env.clock.now(),
            };
            tracing::info!(%booking_id, "Fully sponsored order minted");
            state.open_order(order.clone());
            return Ok(smallvec![reply(correlation_id, Outcome::Order(order))]);
        }

        let gateway = Arc::clone(&env.gateway);
        let currency = env.currency.clone();
        Ok(smallvec![async_effect! {
            match gateway.create_order(amount, currency, receipt).await {
                Ok(order) => Some(BookingAction::PaymentOrderOpened { correlation_id, session, booking_id, order }),
                Err(error) => Some(BookingAction::PaymentOrderFailed { correlation_id, booking_id, error }),
            }
        }])
    }

    /// Record a gateway order, provided the booking is still payable for
    /// exactly the amount the gateway was asked for. The booking keeps a
    /// single open order; a newer checkout replaces the older one.
    fn payment_order_opened(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        order: GatewayOrder,
    ) -> Result<Effects, BookingError> {
        let booking = state
            .booking(&booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        transition(Some(booking.status), BookingEvent::Pay, session.role)?;
        if order.amount != booking.final_amount {
            tracing::warn!(
                %booking_id,
                order_id = %order.order_id,
                ordered = %order.amount,
                due = %booking.final_amount,
                "Gateway order no longer matches the amount due"
            );
            return Err(BookingError::Gateway {
                message: format!(
                    "order {} is for {} but {} is now due; open a new order",
                    order.order_id, order.amount, booking.final_amount
                ),
            });
        }

        let order = PaymentOrder {
            order_id: order.order_id,
            booking_id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            sponsored: false,
            created_at: env.clock.now(),
        };
        tracing::info!(%booking_id, order_id = %order.order_id, amount = %order.amount, "Payment order opened");
        metrics::counter!("payments.orders_opened").increment(1);
        state.open_order(order.clone());

        Ok(smallvec![reply(correlation_id, Outcome::Order(order))])
    }

    /// Checks shared by the initial command and the post-gateway event.
    fn settlement(
        state: &BookingState,
        session: &Session,
        booking_id: BookingId,
        confirmation: &PaymentConfirmation,
    ) -> Result<Settlement, BookingError> {
        let booking = state
            .booking(&booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        authorize(session, Permission::Pay, Some(booking.user_id))?;

        if booking.status == BookingStatus::Confirmed {
            return match &booking.payment {
                Some(receipt) if receipt.payment_id == confirmation.payment_id => {
                    Ok(Settlement::AlreadySettled(Box::new(booking.clone())))
                },
                _ => Err(BookingError::InvalidTransition {
                    status: Some(BookingStatus::Confirmed),
                    event: BookingEvent::Pay,
                }),
            };
        }
        transition(Some(booking.status), BookingEvent::Pay, session.role)?;

        let order = state.orders.get(&confirmation.order_id).ok_or_else(|| {
            BookingError::verification_failed(format!("unknown order {}", confirmation.order_id))
        })?;
        if order.booking_id != booking_id {
            return Err(BookingError::verification_failed(format!(
                "order {} belongs to another booking",
                order.order_id
            )));
        }
        if order.amount != booking.final_amount {
            return Err(BookingError::verification_failed(format!(
                "order amount {} does not match the {} due",
                order.amount, booking.final_amount
            )));
        }
        Ok(Settlement::Due(order.clone()))
    }

    fn verify_payment(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: Session,
        booking_id: BookingId,
        confirmation: PaymentConfirmation,
    ) -> Result<Effects, BookingError> {
        match Self::settlement(state, &session, booking_id, &confirmation)? {
            Settlement::AlreadySettled(booking) => {
                tracing::info!(%booking_id, payment_id = %confirmation.payment_id, "Duplicate payment confirmation");
                metrics::counter!("payments.duplicate_confirmations").increment(1);
                Ok(smallvec![reply(correlation_id, Outcome::Booking(booking))])
            },
            Settlement::Due(order) if order.sponsored => {
                Self::confirm(correlation_id, state, env, &session, booking_id, &order, confirmation.payment_id)
            },
            Settlement::Due(_) => {
                let gateway = Arc::clone(&env.gateway);
                Ok(smallvec![async_effect! {
                    match gateway.verify_payment(confirmation.clone()).await {
                        Ok(()) => Some(BookingAction::PaymentVerified {
                            correlation_id,
                            session,
                            booking_id,
                            confirmation,
                        }),
                        Err(error) => Some(BookingAction::PaymentVerificationRejected {
                            correlation_id,
                            booking_id,
                            error,
                        }),
                    }
                }])
            },
        }
    }

    fn payment_verified(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        confirmation: PaymentConfirmation,
    ) -> Result<Effects, BookingError> {
        match Self::settlement(state, session, booking_id, &confirmation)? {
            Settlement::AlreadySettled(booking) => {
                Ok(smallvec![reply(correlation_id, Outcome::Booking(booking))])
            },
            Settlement::Due(order) => {
                Self::confirm(correlation_id, state, env, session, booking_id, &order, confirmation.payment_id)
            },
        }
    }

    fn confirm(
        correlation_id: Uuid,
        state: &mut BookingState,
        env: &BookingEnvironment,
        session: &Session,
        booking_id: BookingId,
        order: &PaymentOrder,
        payment_id: String,
    ) -> Result<Effects, BookingError> {
        let now = env.clock.now();
        let booking = booking_mut(state, &booking_id)?;

        booking.payment = Some(PaymentReceipt {
            order_id: order.order_id.clone(),
            payment_id: payment_id.clone(),
            amount: booking.final_amount,
            paid_at: now,
        });
        booking.record_transition(BookingStatus::Confirmed, session.user_id, now, None);
        let booking = booking.clone();
        state.close_orders(&booking_id);

        tracing::info!(%booking_id, %payment_id, amount = %booking.final_amount, "Booking confirmed");
        metrics::counter!("payments.confirmed").increment(1);

        let notice = state.account(&booking.user_id).map(|account| ConfirmationNotice {
            booking_id,
            email: account.email.clone(),
            name: account.name.clone(),
            listing_name: state
                .listing(&booking.listing_id)
                .map(|l| l.name.clone())
                .unwrap_or_default(),
            amount: booking.final_amount,
            payment_id,
        });

        let mut effects: Effects = smallvec![reply(correlation_id, Outcome::Booking(Box::new(booking)))];
        if let Some(notice) = notice {
            let notifier = Arc::clone(&env.notifier);
            effects.push(async_effect! {
                if let Err(error) = notifier.booking_confirmed(notice).await {
                    tracing::warn!(%error, %booking_id, "Confirmation notice not delivered");
                    metrics::counter!("notifications.failed").increment(1);
                }
                None::<BookingAction>
            });
        }
        Ok(effects)
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let correlation_id = action.correlation_id();

        let result = match action {
            // ========== Accounts & listings ==========
            BookingAction::RegisterAccount { account, .. } => {
                Self::register_account(correlation_id, state, account)
            },
            BookingAction::DeleteAccount { session, user_id, .. } => {
                Self::delete_account(correlation_id, state, &session, user_id)
            },
            BookingAction::RegisterListing {
                session,
                listing_id,
                listing,
                ..
            } => Self::register_listing(correlation_id, state, env, &session, listing_id, listing),
            BookingAction::UpdateListing {
                session,
                listing_id,
                changes,
                ..
            } => Self::update_listing(correlation_id, state, &session, listing_id, changes),
            BookingAction::PostReview {
                session,
                review_id,
                listing_id,
                rating,
                comment,
                ..
            } => Self::post_review(correlation_id, state, env, &session, review_id, listing_id, rating, comment),
            BookingAction::DeleteListing { session, listing_id, .. } => {
                Self::delete_listing(correlation_id, state, &session, listing_id)
            },

            // ========== Booking lifecycle ==========
            BookingAction::CreateBooking {
                session,
                booking_id,
                listing_id,
                request_aid,
                reason,
                requested_percent,
                ..
            } => Self::create_booking(
                correlation_id,
                state,
                env,
                &session,
                booking_id,
                listing_id,
                request_aid,
                reason,
                requested_percent,
            ),
            BookingAction::RequestAid {
                session,
                booking_id,
                reason,
                requested_percent,
                ..
            } => Self::request_aid(correlation_id, state, env, &session, booking_id, reason, requested_percent),
            BookingAction::ApproveAid {
                session,
                booking_id,
                percent,
                ..
            } => Self::approve_aid(correlation_id, state, env, &session, booking_id, percent),
            BookingAction::RejectAid {
                session,
                booking_id,
                note,
                ..
            } => Self::reject_aid(correlation_id, state, env, &session, booking_id, note),
            BookingAction::CancelBooking { session, booking_id, .. } => {
                Self::cancel_booking(correlation_id, state, env, &session, booking_id)
            },
            BookingAction::DeleteBooking { session, booking_id, .. } => {
                Self::delete_booking(correlation_id, state, &session, booking_id)
            },

            // ========== Payment reconciliation ==========
            BookingAction::CreatePaymentOrder { session, booking_id, .. } => {
                Self::create_payment_order(correlation_id, state, env, session, booking_id)
            },
            BookingAction::PaymentOrderOpened {
                session,
                booking_id,
                order,
                ..
            } => Self::payment_order_opened(correlation_id, state, env, &session, booking_id, order),
            BookingAction::PaymentOrderFailed { booking_id, error, .. } => {
                tracing::error!(%booking_id, %error, "Payment order failed");
                metrics::counter!("payments.orders_failed").increment(1);
                Err(BookingError::Gateway {
                    message: error.to_string(),
                })
            },
            BookingAction::VerifyPayment {
                session,
                booking_id,
                confirmation,
                ..
            } => Self::verify_payment(correlation_id, state, env, session, booking_id, confirmation),
            BookingAction::PaymentVerified {
                session,
                booking_id,
                confirmation,
                ..
            } => Self::payment_verified(correlation_id, state, env, &session, booking_id, confirmation),
            BookingAction::PaymentVerificationRejected { booking_id, error, .. } => {
                metrics::counter!("payments.verification_failed").increment(1);
                match error {
                    GatewayError::InvalidSignature => {
                        tracing::warn!(%booking_id, "Payment signature rejected");
                        Err(BookingError::verification_failed(error.to_string()))
                    },
                    other => Err(BookingError::Gateway {
                        message: other.to_string(),
                    }),
                }
            },

            // ========== Replies (observed by callers, nothing to do) ==========
            BookingAction::Completed { .. } | BookingAction::Rejected { .. } => Ok(SmallVec::new()),
        };

        result.unwrap_or_else(|error| Self::rejected(correlation_id, error))
    }
}
