//! Booking state machine.
//!
//! [`transition`] is the only place that decides whether a status change is
//! legal. It is a pure function of the current status, the event and the
//! actor's role; ownership checks live in [`authz`](crate::authz) and the
//! reducer applies the result.
//!
//! | From          | Event          | To            |
//! |---------------|----------------|---------------|
//! | (none)        | Create         | Pending       |
//! | (none)        | Create (aid)   | RequestingAid |
//! | Pending       | Pay            | Confirmed     |
//! | Pending       | RequestAid     | RequestingAid |
//! | Pending       | Cancel         | Cancelled     |
//! | RequestingAid | ApproveAid(p)  | ApprovedAid   |
//! | RequestingAid | RejectAid      | Pending       |
//! | RequestingAid | Cancel         | Cancelled     |
//! | ApprovedAid   | Pay            | Confirmed     |
//! | ApprovedAid   | Cancel         | Cancelled     |
//! | Confirmed     | Cancel (admin) | Cancelled     |

use crate::error::BookingError;
use crate::types::{BookingStatus, Role};
use std::fmt;

/// Something that can happen to a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BookingEvent {
    /// Booking created, optionally asking for aid straight away
    Create {
        /// Enter `RequestingAid` instead of `Pending`
        request_aid: bool,
    },
    /// Tenant asks for aid
    RequestAid,
    /// Donor sponsors `percent`% of the rent
    ApproveAid {
        /// Requested discount
        percent: u32,
    },
    /// Donor declines the request
    RejectAid,
    /// Externally verified payment
    Pay,
    /// Booking cancelled
    Cancel,
}

impl BookingEvent {
    /// One representative of every event kind
    pub const KINDS: [Self; 6] = [
        Self::Create { request_aid: false },
        Self::RequestAid,
        Self::ApproveAid { percent: 50 },
        Self::RejectAid,
        Self::Pay,
        Self::Cancel,
    ];
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Create { .. } => "create",
            Self::RequestAid => "request aid for",
            Self::ApproveAid { .. } => "approve aid for",
            Self::RejectAid => "reject aid for",
            Self::Pay => "pay for",
            Self::Cancel => "cancel",
        };
        f.write_str(verb)
    }
}

/// Validate an aid percentage, narrowing it to `u8`.
///
/// # Errors
///
/// [`BookingError::InvalidPercent`] unless `percent` is in `1..=100`.
pub fn validate_percent(percent: u32) -> Result<u8, BookingError> {
    match u8::try_from(percent) {
        Ok(p @ 1..=100) => Ok(p),
        _ => Err(BookingError::InvalidPercent { percent }),
    }
}

/// Compute the status `event` leads to from `current`.
///
/// # Errors
///
/// - [`BookingError::InvalidPercent`] for an approval outside `1..=100`
/// - [`BookingError::AlreadyApproved`] for an approval of an `ApprovedAid` booking
/// - [`BookingError::Forbidden`] when anyone but an admin cancels a confirmed booking
/// - [`BookingError::InvalidTransition`] for every other unlisted pair
pub fn transition(
    current: Option<BookingStatus>,
    event: BookingEvent,
    role: Role,
) -> Result<BookingStatus, BookingError> {
    use BookingStatus::{ApprovedAid, Cancelled, Confirmed, Pending, RequestingAid};

    let invalid = || BookingError::InvalidTransition {
        status: current,
        event,
    };

    let Some(status) = current else {
        return match event {
            BookingEvent::Create { request_aid: false } => Ok(Pending),
            BookingEvent::Create { request_aid: true } => Ok(RequestingAid),
            _ => Err(invalid()),
        };
    };

    match (status, event) {
        (Pending | ApprovedAid, BookingEvent::Pay) => Ok(Confirmed),
        (Pending, BookingEvent::RequestAid) => Ok(RequestingAid),
        (RequestingAid, BookingEvent::ApproveAid { percent }) => {
            validate_percent(percent)?;
            Ok(ApprovedAid)
        },
        (ApprovedAid, BookingEvent::ApproveAid { .. }) => Err(BookingError::AlreadyApproved),
        (RequestingAid, BookingEvent::RejectAid) => Ok(Pending),
        (Pending | RequestingAid | ApprovedAid, BookingEvent::Cancel) => Ok(Cancelled),
        (Confirmed, BookingEvent::Cancel) => match role {
            Role::Admin => Ok(Cancelled),
            _ => Err(BookingError::Forbidden {
                role,
                permission: crate::authz::Permission::CancelConfirmedBooking,
            }),
        },
        _ => Err(invalid()),
    }
}
