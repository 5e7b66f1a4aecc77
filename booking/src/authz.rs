//! Role-gated action surface.
//!
//! Every workflow entry point calls [`authorize`] with the acting
//! [`Session`] before touching state. The role table lives here and nowhere
//! else.

use crate::error::BookingError;
use crate::types::{Booking, BookingStatus, Role, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated actor behind a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Acting account
    pub user_id: UserId,
    /// Its role at the time of the request
    pub role: Role,
}

impl Session {
    /// Session for `user_id` acting as `role`
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// An action subject to role gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Book a bed for oneself
    CreateBooking,
    /// Cancel a booking that is not yet confirmed
    CancelBooking,
    /// Cancel a paid booking
    CancelConfirmedBooking,
    /// Ask donors for aid on a booking
    RequestAid,
    /// Approve or reject an aid request
    DecideAid,
    /// Open a payment order and confirm payment
    Pay,
    /// Register, list and delete listings
    ManageListings,
    /// List and delete accounts
    ManageUsers,
    /// Remove a booking record
    DeleteBooking,
    /// See open aid requests
    ViewAidRequests,
    /// See a donor's sponsorship history
    ViewSponsorships,
    /// See platform statistics
    ViewStats,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CreateBooking => "create bookings",
            Self::CancelBooking => "cancel this booking",
            Self::CancelConfirmedBooking => "cancel confirmed bookings",
            Self::RequestAid => "request aid for this booking",
            Self::DecideAid => "approve or reject aid",
            Self::Pay => "pay for this booking",
            Self::ManageListings => "manage this listing",
            Self::ManageUsers => "manage users",
            Self::DeleteBooking => "delete bookings",
            Self::ViewAidRequests => "view aid requests",
            Self::ViewSponsorships => "view this sponsorship history",
            Self::ViewStats => "view platform statistics",
        };
        f.write_str(text)
    }
}

/// How far a role's grant reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Denied,
    /// Only resources the actor owns
    Own,
    Any,
}

const fn scope(role: Role, permission: Permission) -> Scope {
    use Permission as P;

    match (role, permission) {
        (Role::User, P::CreateBooking | P::CancelBooking | P::RequestAid | P::Pay)
        | (Role::Owner, P::ManageListings)
        | (Role::Donor, P::ViewSponsorships) => Scope::Own,

        (Role::Donor, P::DecideAid | P::ViewAidRequests)
        | (
            Role::Admin,
            P::CancelBooking
            | P::CancelConfirmedBooking
            | P::ManageListings
            | P::ManageUsers
            | P::DeleteBooking
            | P::ViewSponsorships
            | P::ViewStats,
        ) => Scope::Any,

        _ => Scope::Denied,
    }
}

/// Check that `session` may exercise `permission`.
///
/// `owner` is the account owning the target resource (the booking's tenant,
/// the listing's owner, the donor whose history is read); `None` when the
/// action has no single owner.
///
/// # Errors
///
/// [`BookingError::Forbidden`] when the role lacks the permission, or holds
/// it only for its own resources and `owner` is someone else.
pub fn authorize(
    session: &Session,
    permission: Permission,
    owner: Option<UserId>,
) -> Result<(), BookingError> {
    let allowed = match scope(session.role, permission) {
        Scope::Any => true,
        Scope::Own => owner.is_none_or(|owner| owner == session.user_id),
        Scope::Denied => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %session.user_id,
            role = %session.role,
            %permission,
            "Permission denied"
        );
        Err(BookingError::Forbidden {
            role: session.role,
            permission,
        })
    }
}

/// Whether `session` may read `booking`.
///
/// Readable by its tenant, the owner of the booked listing, the sponsoring
/// donor, any donor while aid is being requested, and admins.
#[must_use]
pub fn can_view_booking(session: &Session, booking: &Booking, listing_owner: Option<UserId>) -> bool {
    match session.role {
        Role::Admin => true,
        Role::User => booking.user_id == session.user_id,
        Role::Owner => listing_owner == Some(session.user_id),
        Role::Donor => {
            booking.donor_id == Some(session.user_id)
                || booking.status == BookingStatus::RequestingAid
        },
    }
}
