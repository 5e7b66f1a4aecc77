//! Aid and sponsorship rules.
//!
//! Discount arithmetic, the single-sponsor guard and the donor-facing read
//! views. Mutation happens in the reducer; everything here is pure.

use crate::error::BookingError;
use crate::types::{Booking, BookingState, BookingStatus, Money, SponsorshipRecord, UserId};
use serde::{Deserialize, Serialize};

/// Split `base` into the donor's share and the tenant's remainder.
///
/// The donor's share rounds down to the paisa, so the remainder is never
/// less than `base * (1 - percent / 100)` and never more than `base`.
#[must_use]
pub const fn discount(base: Money, percent: u8) -> (Money, Money) {
    let covered = base.percent_of(percent);
    (covered, base.saturating_sub(covered))
}

/// A booking may be sponsored once; a live booking with a donor is done.
///
/// # Errors
///
/// [`BookingError::AlreadyApproved`] if a donor already sponsored `booking`.
pub const fn ensure_sponsorable(booking: &Booking) -> Result<(), BookingError> {
    if booking.donor_id.is_some() && !matches!(booking.status, BookingStatus::Cancelled) {
        return Err(BookingError::AlreadyApproved);
    }
    Ok(())
}

/// Bookings waiting for a donor, oldest first.
#[must_use]
pub fn pending_aid_requests(state: &BookingState) -> Vec<&Booking> {
    state.bookings_where(|b| b.status == BookingStatus::RequestingAid)
}

/// One line of a donor's sponsorship history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipView {
    /// Ledger entry written at approval
    #[serde(flatten)]
    pub record: SponsorshipRecord,
    /// The booking's status now; `None` once the booking was deleted
    pub current_status: Option<BookingStatus>,
}

/// Every approval `donor_id` made, in approval order, whatever became of the booking.
#[must_use]
pub fn sponsorship_history(state: &BookingState, donor_id: UserId) -> Vec<SponsorshipView> {
    state
        .sponsorships
        .iter()
        .filter(|record| record.donor_id == donor_id)
        .map(|record| SponsorshipView {
            record: record.clone(),
            current_status: state.booking(&record.booking_id).map(|b| b.status),
        })
        .collect()
}
