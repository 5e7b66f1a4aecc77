//! Request/response facade over the booking store.
//!
//! Writes are sent to the [`Store`] as commands with a fresh correlation id
//! and answered by the reply action the reducer emits. Reads take a
//! consistent snapshot through [`Store::state`] and never go through the
//! reducer.

use crate::aid::{self, SponsorshipView};
use crate::authz::{Permission, Session, authorize, can_view_booking};
use crate::error::{BookingError, BookingResult};
use crate::payment_gateway::PaymentConfirmation;
use crate::reducer::{BookingAction, BookingEnvironment, BookingReducer, ListingUpdate, NewListing, Outcome};
use crate::sessions::SessionDirectory;
use crate::types::{
    Account, Booking, BookingId, BookingState, BookingStatus, Listing, ListingId, Money, PaymentOrder, Review,
    ReviewId, Role, UserId,
};
use chrono::{DateTime, Utc};
use pgstay_core::environment::Clock;
use pgstay_runtime::{Store, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The store type behind the service
pub type BookingStore = Store<BookingState, BookingAction, BookingEnvironment, BookingReducer>;

/// Default time a caller waits for a reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default days between booking and rent due date
pub const DEFAULT_DUE_PERIOD_DAYS: u32 = 30;

/// A booking as shown to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingView {
    /// The booking record
    #[serde(flatten)]
    pub booking: Booking,
    /// Name of the booked listing, if it still exists
    pub listing_name: Option<String>,
    /// Rent due date
    pub due_date: DateTime<Utc>,
    /// Days left until the due date (negative once overdue)
    pub days_until_due: i64,
}

/// A listing with its occupancy and rating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingView {
    /// The listing record
    #[serde(flatten)]
    pub listing: Listing,
    /// Beds held by bookings that were not cancelled
    pub occupied_beds: usize,
    /// Beds still bookable
    pub available_beds: usize,
    /// Reviews posted
    pub review_count: usize,
    /// Mean rating, absent before the first review
    pub average_rating: Option<f64>,
}

/// Parameters of a new booking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Listing to book
    pub listing_id: ListingId,
    /// Ask for aid straight away
    #[serde(default)]
    pub request_aid: bool,
    /// Why aid is needed
    #[serde(default)]
    pub reason: Option<String>,
    /// Discount hoped for
    #[serde(default)]
    pub requested_percent: Option<u32>,
}

/// Platform statistics for administrators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    /// Registered accounts
    pub users: usize,
    /// Registered listings
    pub listings: usize,
    /// Booking count per status
    pub bookings_by_status: BTreeMap<BookingStatus, usize>,
    /// Sum paid on confirmed bookings
    pub confirmed_revenue: Money,
    /// Sum covered by donors on bookings that were not cancelled
    pub sponsored_amount: Money,
}

/// The booking workflow as async request/response calls.
#[derive(Clone)]
pub struct BookingService {
    store: BookingStore,
    clock: Arc<dyn Clock>,
    sessions: Arc<dyn SessionDirectory>,
    request_timeout: Duration,
    due_period_days: u32,
}

impl BookingService {
    /// Service over `store`, authenticating through `sessions`.
    #[must_use]
    pub fn new(store: BookingStore, clock: Arc<dyn Clock>, sessions: Arc<dyn SessionDirectory>) -> Self {
        Self {
            store,
            clock,
            sessions,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            due_period_days: DEFAULT_DUE_PERIOD_DAYS,
        }
    }

    /// Wait at most `timeout` for each reply
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Rent is due `days` after the booking date
    #[must_use]
    pub const fn with_due_period_days(mut self, days: u32) -> Self {
        self.due_period_days = days;
        self
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &BookingStore {
        &self.store
    }

    /// Stop accepting commands and drain running effects.
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownTimeout`] if effects are still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }

    #[tracing::instrument(skip(self, action), fields(correlation_id = tracing::field::Empty))]
    async fn dispatch(&self, action: BookingAction) -> BookingResult<Outcome> {
        let correlation_id = action.correlation_id();
        tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));

        let reply = self
            .store
            .send_and_wait_for(
                action,
                move |a| a.is_reply() && a.correlation_id() == correlation_id,
                self.request_timeout,
            )
            .await
            .map_err(|error| {
                tracing::error!(%error, "Command did not complete");
                BookingError::Unavailable {
                    message: error.to_string(),
                }
            })?;

        match reply {
            BookingAction::Completed { outcome, .. } => Ok(outcome),
            BookingAction::Rejected { error, .. } => Err(error),
            _ => Err(unexpected()),
        }
    }

    fn view(&self, state: &BookingState, booking: &Booking) -> BookingView {
        BookingView {
            booking: booking.clone(),
            listing_name: state.listing(&booking.listing_id).map(|l| l.name.clone()),
            due_date: booking.due_date(self.due_period_days),
            days_until_due: booking.days_until_due(self.clock.now(), self.due_period_days),
        }
    }

    async fn booking_view(&self, outcome: Outcome) -> BookingResult<BookingView> {
        let Outcome::Booking(booking) = outcome else {
            return Err(unexpected());
        };
        Ok(self.store.state(|s| self.view(s, &booking)).await)
    }

    // ========== Sessions & accounts ==========

    /// Resolve a bearer token to a session; the role comes from the live account.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unauthenticated`] for unknown tokens and deleted accounts.
    pub async fn authenticate(&self, token: &str) -> BookingResult<Session> {
        let user_id = self.sessions.resolve(token).ok_or(BookingError::Unauthenticated)?;
        self.store
            .state(|s| s.account(&user_id).map(|a| Session::new(a.id, a.role)))
            .await
            .ok_or(BookingError::Unauthenticated)
    }

    /// Create or replace an account.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidInput`] for an empty name or email.
    pub async fn register_account(&self, account: Account) -> BookingResult<Account> {
        match self
            .dispatch(BookingAction::RegisterAccount {
                correlation_id: Uuid::new_v4(),
                account,
            })
            .await?
        {
            Outcome::Account(account) => Ok(account),
            _ => Err(unexpected()),
        }
    }

    /// Every account, ordered by name (admin only).
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] for non-admins.
    pub async fn list_users(&self, session: &Session) -> BookingResult<Vec<Account>> {
        authorize(session, Permission::ManageUsers, None)?;
        Ok(self
            .store
            .state(|s| {
                let mut accounts: Vec<Account> = s.accounts.values().cloned().collect();
                accounts.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
                accounts
            })
            .await)
    }

    /// Remove an account (admin only, never oneself).
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`], [`BookingError::NotFound`] or
    /// [`BookingError::InvalidInput`] for self-deletion.
    pub async fn delete_user(&self, session: &Session, user_id: UserId) -> BookingResult<()> {
        self.dispatch(BookingAction::DeleteAccount {
            correlation_id: Uuid::new_v4(),
            session: *session,
            user_id,
        })
        .await
        .map(|_| ())
    }

    // ========== Listings ==========

    /// Listings open for booking, optionally filtered by city (case-insensitive).
    pub async fn browse_listings(&self, city: Option<&str>) -> Vec<Listing> {
        let city = city.map(str::to_lowercase);
        self.store
            .state(|s| {
                s.listings_where(|l| city.as_ref().is_none_or(|c| l.city.to_lowercase() == *c))
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Listings the session manages: its own for owners, all for admins.
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] for other roles.
    pub async fn list_managed_listings(&self, session: &Session) -> BookingResult<Vec<Listing>> {
        authorize(session, Permission::ManageListings, None)?;
        let session = *session;
        Ok(self
            .store
            .state(|s| {
                s.listings_where(|l| session.role == Role::Admin || l.owner_id == session.user_id)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .await)
    }

    /// Register a listing.
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`], [`BookingError::NotFound`] for an unknown
    /// owner, or [`BookingError::InvalidInput`] for bad values.
    pub async fn register_listing(&self, session: &Session, listing: NewListing) -> BookingResult<Listing> {
        match self
            .dispatch(BookingAction::RegisterListing {
                correlation_id: Uuid::new_v4(),
                session: *session,
                listing_id: ListingId::new(),
                listing,
            })
            .await?
        {
            Outcome::Listing(listing) => Ok(listing),
            _ => Err(unexpected()),
        }
    }

    /// One listing with occupancy and rating. Open to everyone.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for unknown listings.
    pub async fn get_listing(&self, listing_id: ListingId) -> BookingResult<ListingView> {
        self.store
            .state(|s| {
                let listing = s.listing(&listing_id)?;
                let occupied_beds = s.occupied_beds(&listing_id);
                Some(ListingView {
                    listing: listing.clone(),
                    occupied_beds,
                    available_beds: (listing.capacity as usize).saturating_sub(occupied_beds),
                    review_count: s.reviews_of(&listing_id).len(),
                    average_rating: s.average_rating(&listing_id),
                })
            })
            .await
            .ok_or_else(|| BookingError::not_found("listing", listing_id))
    }

    /// Change a listing's details. Bookings already made keep their rent.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Forbidden`] unless the
    /// session owns the listing or is an admin, or
    /// [`BookingError::InvalidInput`] for bad values.
    pub async fn update_listing(
        &self,
        session: &Session,
        listing_id: ListingId,
        changes: ListingUpdate,
    ) -> BookingResult<Listing> {
        match self
            .dispatch(BookingAction::UpdateListing {
                correlation_id: Uuid::new_v4(),
                session: *session,
                listing_id,
                changes,
            })
            .await?
        {
            Outcome::Listing(listing) => Ok(listing),
            _ => Err(unexpected()),
        }
    }

    /// Rate a listing as the session's user.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for unknown listings,
    /// [`BookingError::InvalidInput`] for a rating outside `1..=5` or an
    /// overlong comment.
    pub async fn post_review(
        &self,
        session: &Session,
        listing_id: ListingId,
        rating: u32,
        comment: Option<String>,
    ) -> BookingResult<Review> {
        match self
            .dispatch(BookingAction::PostReview {
                correlation_id: Uuid::new_v4(),
                session: *session,
                review_id: ReviewId::new(),
                listing_id,
                rating,
                comment,
            })
            .await?
        {
            Outcome::Review(review) => Ok(review),
            _ => Err(unexpected()),
        }
    }

    /// Reviews of a listing, newest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for unknown listings.
    pub async fn list_reviews(&self, listing_id: ListingId) -> BookingResult<Vec<Review>> {
        self.store
            .state(|s| {
                s.listing(&listing_id)?;
                Some(s.reviews_of(&listing_id).into_iter().cloned().collect())
            })
            .await
            .ok_or_else(|| BookingError::not_found("listing", listing_id))
    }

    /// Remove a listing and its reviews; its bookings are kept.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] or [`BookingError::Forbidden`].
    pub async fn delete_listing(&self, session: &Session, listing_id: ListingId) -> BookingResult<()> {
        self.dispatch(BookingAction::DeleteListing {
            correlation_id: Uuid::new_v4(),
            session: *session,
            listing_id,
        })
        .await
        .map(|_| ())
    }

    /// Bookings on the owner's listings (all bookings for admins).
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] for users and donors.
    pub async fn owner_bookings(&self, session: &Session) -> BookingResult<Vec<BookingView>> {
        authorize(session, Permission::ManageListings, None)?;
        let session = *session;
        Ok(self
            .store
            .state(|s| {
                let found = if session.role == Role::Admin {
                    s.bookings_where(|_| true)
                } else {
                    s.bookings_by_owner(session.user_id)
                };
                found.into_iter().map(|b| self.view(s, b)).collect()
            })
            .await)
    }

    // ========== Booking lifecycle ==========

    /// Book a bed for the session's user.
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`], [`BookingError::NotFound`],
    /// [`BookingError::InvalidPercent`] or [`BookingError::CapacityExceeded`].
    pub async fn create_booking(&self, session: &Session, request: NewBooking) -> BookingResult<BookingView> {
        let outcome = self
            .dispatch(BookingAction::CreateBooking {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id: BookingId::new(),
                listing_id: request.listing_id,
                request_aid: request.request_aid,
                reason: request.reason,
                requested_percent: request.requested_percent,
            })
            .await?;
        self.booking_view(outcome).await
    }

    /// Ask donors for aid on a pending booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] unless the booking is `Pending`.
    pub async fn request_aid(
        &self,
        session: &Session,
        booking_id: BookingId,
        reason: Option<String>,
        requested_percent: Option<u32>,
    ) -> BookingResult<BookingView> {
        let outcome = self
            .dispatch(BookingAction::RequestAid {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id,
                reason,
                requested_percent,
            })
            .await?;
        self.booking_view(outcome).await
    }

    /// Sponsor `percent`% of a booking's rent.
    ///
    /// # Errors
    ///
    /// [`BookingError::AlreadyApproved`] when another donor won,
    /// [`BookingError::InvalidPercent`] outside `1..=100`.
    pub async fn approve_aid(
        &self,
        session: &Session,
        booking_id: BookingId,
        percent: u32,
    ) -> BookingResult<BookingView> {
        let outcome = self
            .dispatch(BookingAction::ApproveAid {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id,
                percent,
            })
            .await?;
        self.booking_view(outcome).await
    }

    /// Decline an aid request; the booking returns to `Pending`.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] unless aid is being requested.
    pub async fn reject_aid(
        &self,
        session: &Session,
        booking_id: BookingId,
        note: Option<String>,
    ) -> BookingResult<BookingView> {
        let outcome = self
            .dispatch(BookingAction::RejectAid {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id,
                note,
            })
            .await?;
        self.booking_view(outcome).await
    }

    /// Open a payment order for the amount due. Does not change the booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] unless the booking is payable,
    /// [`BookingError::Gateway`] when the gateway fails.
    pub async fn create_order(&self, session: &Session, booking_id: BookingId) -> BookingResult<PaymentOrder> {
        match self
            .dispatch(BookingAction::CreatePaymentOrder {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id,
            })
            .await?
        {
            Outcome::Order(order) => Ok(order),
            _ => Err(unexpected()),
        }
    }

    /// Confirm a booking from the gateway's payment confirmation.
    ///
    /// Repeating the call with the same payment reference succeeds without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// [`BookingError::PaymentVerificationFailed`] for a bad signature, an
    /// unknown order or an amount mismatch; the booking keeps its status.
    pub async fn verify_and_confirm(
        &self,
        session: &Session,
        booking_id: BookingId,
        confirmation: PaymentConfirmation,
    ) -> BookingResult<BookingView> {
        let outcome = self
            .dispatch(BookingAction::VerifyPayment {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id,
                confirmation,
            })
            .await?;
        self.booking_view(outcome).await
    }

    /// Cancel a booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] or [`BookingError::InvalidTransition`].
    pub async fn cancel(&self, session: &Session, booking_id: BookingId) -> BookingResult<BookingView> {
        let outcome = self
            .dispatch(BookingAction::CancelBooking {
                correlation_id: Uuid::new_v4(),
                session: *session,
                booking_id,
            })
            .await?;
        self.booking_view(outcome).await
    }

    /// Remove a booking record (admin only).
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] or [`BookingError::NotFound`].
    pub async fn delete_booking(&self, session: &Session, booking_id: BookingId) -> BookingResult<()> {
        self.dispatch(BookingAction::DeleteBooking {
            correlation_id: Uuid::new_v4(),
            session: *session,
            booking_id,
        })
        .await
        .map(|_| ())
    }

    // ========== Reads ==========

    /// One booking, if the session may see it.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] when the booking does not exist or is not
    /// visible to the session.
    pub async fn get_booking(&self, session: &Session, booking_id: BookingId) -> BookingResult<BookingView> {
        self.store
            .state(|s| {
                s.booking(&booking_id)
                    .filter(|b| {
                        let owner = s.listing(&b.listing_id).map(|l| l.owner_id);
                        can_view_booking(session, b, owner)
                    })
                    .map(|b| self.view(s, b))
            })
            .await
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    /// The session's own bookings, oldest first.
    pub async fn list_my_bookings(&self, session: &Session) -> Vec<BookingView> {
        self.store
            .state(|s| {
                s.bookings_by_user(session.user_id)
                    .into_iter()
                    .map(|b| self.view(s, b))
                    .collect()
            })
            .await
    }

    /// Every booking waiting for a donor (donors only).
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] for other roles.
    pub async fn list_pending_aid_requests(&self, session: &Session) -> BookingResult<Vec<BookingView>> {
        authorize(session, Permission::ViewAidRequests, None)?;
        Ok(self
            .store
            .state(|s| {
                aid::pending_aid_requests(s)
                    .into_iter()
                    .map(|b| self.view(s, b))
                    .collect()
            })
            .await)
    }

    /// Every sponsorship `donor_id` approved, whatever became of the booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] unless the session is that donor or an admin.
    pub async fn list_sponsorship_history(
        &self,
        session: &Session,
        donor_id: UserId,
    ) -> BookingResult<Vec<SponsorshipView>> {
        authorize(session, Permission::ViewSponsorships, Some(donor_id))?;
        Ok(self
            .store
            .state(|s| aid::sponsorship_history(s, donor_id))
            .await)
    }

    /// Platform statistics (admin only).
    ///
    /// # Errors
    ///
    /// [`BookingError::Forbidden`] for non-admins.
    pub async fn stats(&self, session: &Session) -> BookingResult<AdminStats> {
        authorize(session, Permission::ViewStats, None)?;
        Ok(self.store.state(admin_stats).await)
    }
}

fn admin_stats(state: &BookingState) -> AdminStats {
    let mut bookings_by_status: BTreeMap<BookingStatus, usize> =
        BookingStatus::ALL.into_iter().map(|status| (status, 0)).collect();
    let mut confirmed_revenue = Money::ZERO;
    let mut sponsored_amount = Money::ZERO;

    for booking in state.bookings.values() {
        *bookings_by_status.entry(booking.status).or_default() += 1;
        if booking.status == BookingStatus::Confirmed {
            confirmed_revenue = confirmed_revenue.saturating_add(booking.final_amount);
        }
        if booking.is_active() {
            sponsored_amount = sponsored_amount.saturating_add(booking.discount_amount());
        }
    }

    AdminStats {
        users: state.accounts.len(),
        listings: state.listings.len(),
        bookings_by_status,
        confirmed_revenue,
        sponsored_amount,
    }
}

fn unexpected() -> BookingError {
    BookingError::Unavailable {
        message: "unexpected reply from the booking store".to_string(),
    }
}
