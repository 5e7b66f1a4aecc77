//! Domain types for the booking service.
//!
//! Value objects (identifiers, money, roles, statuses), the entities the
//! reducer owns (accounts, listings, bookings, payment orders, sponsorship
//! records) and the aggregate [`BookingState`] with its query helpers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an account (user, owner, donor or admin)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a PG listing
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListingId(Uuid);

impl ListingId {
    /// Creates a new random `ListingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ListingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ListingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a listing review
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReviewId(Uuid);

impl ReviewId {
    /// Creates a new random `ReviewId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReviewId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money (paise-based to avoid floating point errors)
// ============================================================================

/// An INR amount held in paise (1/100 rupee).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero rupees
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from paise
    #[must_use]
    pub const fn from_paise(paise: u64) -> Self {
        Self(paise)
    }

    /// Creates a `Money` value from whole rupees, saturating on overflow
    #[must_use]
    pub const fn from_rupees(rupees: u64) -> Self {
        Self(rupees.saturating_mul(100))
    }

    /// Amount in paise
    #[must_use]
    pub const fn paise(&self) -> u64 {
        self.0
    }

    /// Whether nothing is owed
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `percent`% of this amount, rounded down to the paisa.
    ///
    /// `percent` above 100 is clamped so the share never exceeds the amount.
    #[must_use]
    pub const fn percent_of(&self, percent: u8) -> Self {
        let percent = if percent > 100 { 100 } else { percent as u64 };
        // u128 so that large amounts cannot overflow before the division
        #[allow(clippy::cast_possible_truncation)]
        let share = (self.0 as u128 * percent as u128 / 100) as u64;
        Self(share)
    }

    /// Subtract, stopping at zero
    #[must_use]
    pub const fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Add, stopping at `u64::MAX` paise
    #[must_use]
    pub const fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Roles & statuses
// ============================================================================

/// The role attached to an account; drives every authorization decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Tenant looking for accommodation
    User,
    /// Listing owner
    Owner,
    /// Sponsor funding part of a booking
    Donor,
    /// Platform administrator
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "USER",
            Self::Owner => "OWNER",
            Self::Donor => "DONOR",
            Self::Admin => "ADMIN",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Created, awaiting payment
    Pending,
    /// Waiting for a donor to sponsor part of the rent
    RequestingAid,
    /// A donor approved a discount; the remainder is payable
    ApprovedAid,
    /// Paid and verified
    Confirmed,
    /// Cancelled (terminal)
    Cancelled,
}

impl BookingStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::RequestingAid,
        Self::ApprovedAid,
        Self::Confirmed,
        Self::Cancelled,
    ];

    /// No event leaves this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::RequestingAid => "REQUESTING_AID",
            Self::ApprovedAid => "APPROVED_AID",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A registered account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email (confirmation notices go here)
    pub email: String,
    /// Role
    pub role: Role,
}

/// A paying-guest accommodation listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing ID
    pub id: ListingId,
    /// Owning account
    pub owner_id: UserId,
    /// Display name
    pub name: String,
    /// City the PG is located in
    pub city: String,
    /// Monthly rent
    pub rent: Money,
    /// Beds available; non-cancelled bookings count against it
    pub capacity: u32,
    /// When the listing was registered
    pub created_at: DateTime<Utc>,
}

/// Aid requested by the tenant for a booking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AidRequest {
    /// Why aid is needed
    pub reason: Option<String>,
    /// Discount the tenant hopes for; the donor is not bound by it
    pub requested_percent: Option<u8>,
    /// Discount the donor approved
    pub approved_percent: Option<u8>,
}

/// Proof of a verified payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Gateway order the payment settled
    pub order_id: String,
    /// Gateway payment reference
    pub payment_id: String,
    /// Amount paid
    pub amount: Money,
    /// When the booking was confirmed
    pub paid_at: DateTime<Utc>,
}

/// One entry of a booking's audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Previous status (`None` at creation)
    pub from: Option<BookingStatus>,
    /// New status
    pub to: BookingStatus,
    /// Account that triggered the change
    pub actor: UserId,
    /// When it happened
    pub at: DateTime<Utc>,
    /// Extra context (rejections, approvals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A booking of one bed in a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Tenant who booked
    pub user_id: UserId,
    /// Booked listing
    pub listing_id: ListingId,
    /// Creation time
    pub booking_date: DateTime<Utc>,
    /// Current status
    pub status: BookingStatus,
    /// Listing rent at booking time
    pub base_amount: Money,
    /// Discount approved by a donor (0 without aid)
    pub discount_percent: u8,
    /// Sponsoring donor
    pub donor_id: Option<UserId>,
    /// Amount the tenant pays
    pub final_amount: Money,
    /// Aid request, while one is open or approved
    pub aid_request: Option<AidRequest>,
    /// Payment that confirmed the booking
    pub payment: Option<PaymentReceipt>,
    /// Audit trail, oldest first
    pub history: Vec<StatusChange>,
}

impl Booking {
    /// A fresh booking for `listing` priced at its current rent.
    #[must_use]
    pub fn new(
        id: BookingId,
        user_id: UserId,
        listing: &Listing,
        status: BookingStatus,
        booking_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            listing_id: listing.id,
            booking_date,
            status,
            base_amount: listing.rent,
            discount_percent: 0,
            donor_id: None,
            final_amount: listing.rent,
            aid_request: None,
            payment: None,
            history: vec![StatusChange {
                from: None,
                to: status,
                actor: user_id,
                at: booking_date,
                note: None,
            }],
        }
    }

    /// Amount covered by the sponsoring donor
    #[must_use]
    pub const fn discount_amount(&self) -> Money {
        self.base_amount.saturating_sub(self.final_amount)
    }

    /// Whether the booking still holds a bed
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.status, BookingStatus::Cancelled)
    }

    /// Move to `to`, appending the change to the audit trail.
    pub fn record_transition(
        &mut self,
        to: BookingStatus,
        actor: UserId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) {
        self.history.push(StatusChange {
            from: Some(self.status),
            to,
            actor,
            at,
            note,
        });
        self.status = to;
    }

    /// Rent due date: `due_period_days` after the booking date, clamped to
    /// the latest representable instant.
    #[must_use]
    pub fn due_date(&self, due_period_days: u32) -> DateTime<Utc> {
        self.booking_date
            .checked_add_signed(Duration::days(i64::from(due_period_days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whole days from `now` until the due date; negative once overdue.
    #[must_use]
    pub fn days_until_due(&self, now: DateTime<Utc>, due_period_days: u32) -> i64 {
        (self.due_date(due_period_days) - now).num_days()
    }
}

/// An order opened with the payment gateway (or minted locally when nothing is owed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Gateway order handle
    pub order_id: String,
    /// Booking being paid
    pub booking_id: BookingId,
    /// Amount to collect
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Receipt reference sent to the gateway
    pub receipt: String,
    /// Fully sponsored order settled without the gateway
    pub sponsored: bool,
    /// When the order was opened
    pub created_at: DateTime<Utc>,
}

/// A tenant's rating of a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Review ID
    pub id: ReviewId,
    /// Listing reviewed
    pub listing_id: ListingId,
    /// Author
    pub user_id: UserId,
    /// Stars, 1 to 5
    pub rating: u8,
    /// Free text, may be empty
    pub comment: String,
    /// When the review was posted
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a donor's approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipRecord {
    /// Sponsored booking
    pub booking_id: BookingId,
    /// Sponsoring donor
    pub donor_id: UserId,
    /// Tenant who benefits
    pub user_id: UserId,
    /// Listing booked
    pub listing_id: ListingId,
    /// Approved discount
    pub percent: u8,
    /// Amount covered
    pub amount: Money,
    /// When the donor approved
    pub approved_at: DateTime<Utc>,
}

// ============================================================================
// State
// ============================================================================

/// Everything the booking reducer owns.
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// Registered accounts
    pub accounts: HashMap<UserId, Account>,
    /// Listings by ID
    pub listings: HashMap<ListingId, Listing>,
    /// Bookings by ID
    pub bookings: HashMap<BookingId, Booking>,
    /// Open payment orders by gateway order ID
    pub orders: HashMap<String, PaymentOrder>,
    /// Sponsorship ledger, in approval order
    pub sponsorships: Vec<SponsorshipRecord>,
    /// Listing reviews, in posting order
    pub reviews: Vec<Review>,
}

impl BookingState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a booking
    #[must_use]
    pub fn booking(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    /// Look up a listing
    #[must_use]
    pub fn listing(&self, id: &ListingId) -> Option<&Listing> {
        self.listings.get(id)
    }

    /// Look up an account
    #[must_use]
    pub fn account(&self, id: &UserId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Make `order` the booking's only open order.
    pub fn open_order(&mut self, order: PaymentOrder) {
        self.close_orders(&order.booking_id);
        self.orders.insert(order.order_id.clone(), order);
    }

    /// Drop every open order for `booking_id`.
    pub fn close_orders(&mut self, booking_id: &BookingId) {
        self.orders.retain(|_, order| order.booking_id != *booking_id);
    }

    /// The open order for `booking_id`, if any
    #[must_use]
    pub fn open_order_for(&self, booking_id: &BookingId) -> Option<&PaymentOrder> {
        self.orders.values().find(|order| order.booking_id == *booking_id)
    }

    /// Non-cancelled bookings holding a bed in `listing_id`
    #[must_use]
    pub fn occupied_beds(&self, listing_id: &ListingId) -> usize {
        self.bookings
            .values()
            .filter(|b| b.listing_id == *listing_id && b.is_active())
            .count()
    }

    /// Bookings matching `filter`, oldest first
    pub fn bookings_where<F>(&self, filter: F) -> Vec<&Booking>
    where
        F: Fn(&Booking) -> bool,
    {
        let mut found: Vec<&Booking> = self.bookings.values().filter(|b| filter(b)).collect();
        found.sort_by_key(|b| (b.booking_date, b.id));
        found
    }

    /// Bookings made by `user_id`
    #[must_use]
    pub fn bookings_by_user(&self, user_id: UserId) -> Vec<&Booking> {
        self.bookings_where(|b| b.user_id == user_id)
    }

    /// Bookings on listings owned by `owner_id`
    #[must_use]
    pub fn bookings_by_owner(&self, owner_id: UserId) -> Vec<&Booking> {
        self.bookings_where(|b| {
            self.listings
                .get(&b.listing_id)
                .is_some_and(|l| l.owner_id == owner_id)
        })
    }

    /// Reviews of `listing_id`, newest first
    #[must_use]
    pub fn reviews_of(&self, listing_id: &ListingId) -> Vec<&Review> {
        let mut found: Vec<&Review> = self.reviews.iter().filter(|r| r.listing_id == *listing_id).collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        found
    }

    /// Mean rating of `listing_id`, `None` before the first review
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_rating(&self, listing_id: &ListingId) -> Option<f64> {
        let (count, total) = self
            .reviews
            .iter()
            .filter(|r| r.listing_id == *listing_id)
            .fold((0_u32, 0_u32), |(count, total), r| (count + 1, total + u32::from(r.rating)));
        (count > 0).then(|| f64::from(total) / f64::from(count))
    }

    /// Listings, ordered by name
    pub fn listings_where<F>(&self, filter: F) -> Vec<&Listing>
    where
        F: Fn(&Listing) -> bool,
    {
        let mut found: Vec<&Listing> = self.listings.values().filter(|l| filter(l)).collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found
    }
}
