//! Booking workflow errors.
//!
//! Every failed command ends with exactly one [`BookingError`]. The display
//! text is the human-readable message shown to the caller; [`BookingError::code`]
//! is the stable machine-readable code.

use crate::authz::Permission;
use crate::machine::BookingEvent;
use crate::types::{BookingStatus, ListingId, Role};
use thiserror::Error;

/// Convenience alias for workflow results
pub type BookingResult<T> = Result<T, BookingError>;

/// Errors produced by the booking workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The event is not legal from the booking's current status
    #[error("cannot {event} a booking that is {}", describe_status(.status))]
    InvalidTransition {
        /// Current status (`None` when the booking does not exist yet)
        status: Option<BookingStatus>,
        /// Attempted event
        event: BookingEvent,
    },

    /// The acting role may not perform the action
    #[error("{role} accounts may not {permission}")]
    Forbidden {
        /// Acting role
        role: Role,
        /// Denied permission
        permission: Permission,
    },

    /// Aid percentage outside 1..=100
    #[error("aid percentage must be between 1 and 100, got {percent}")]
    InvalidPercent {
        /// Offending value
        percent: u32,
    },

    /// Another donor already sponsored the booking
    #[error("aid for this booking has already been approved")]
    AlreadyApproved,

    /// Gateway signature, order or amount did not check out
    #[error("payment verification failed: {reason}")]
    PaymentVerificationFailed {
        /// What did not match
        reason: String,
    },

    /// Unknown booking, listing or account
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource
        resource: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Every bed in the listing is taken
    #[error("listing {listing_id} is full ({capacity} beds)")]
    CapacityExceeded {
        /// Full listing
        listing_id: ListingId,
        /// Its capacity
        capacity: u32,
    },

    /// Missing or unknown bearer token
    #[error("a valid session is required")]
    Unauthenticated,

    /// Malformed listing or account data
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What is wrong
        reason: String,
    },

    /// The payment gateway could not be reached or refused the order
    #[error("payment gateway error: {message}")]
    Gateway {
        /// Gateway-reported message
        message: String,
    },

    /// The service is shutting down or did not answer in time
    #[error("service unavailable: {message}")]
    Unavailable {
        /// Cause
        message: String,
    },
}

fn describe_status(status: &Option<BookingStatus>) -> String {
    status.map_or_else(|| "not yet created".to_string(), |s| s.to_string())
}

impl BookingError {
    /// Stable code for API clients
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::InvalidPercent { .. } => "INVALID_PERCENT",
            Self::AlreadyApproved => "ALREADY_APPROVED",
            Self::PaymentVerificationFailed { .. } => "PAYMENT_VERIFICATION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Gateway { .. } => "GATEWAY_ERROR",
            Self::Unavailable { .. } => "UNAVAILABLE",
        }
    }

    /// `NotFound` for `resource` with the given id
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// `InvalidInput` with `reason`
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// `PaymentVerificationFailed` with `reason`
    pub fn verification_failed(reason: impl Into<String>) -> Self {
        Self::PaymentVerificationFailed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_status_and_event() {
        let err = BookingError::InvalidTransition {
            status: Some(BookingStatus::Cancelled),
            event: BookingEvent::ApproveAid { percent: 20 },
        };
        assert_eq!(err.to_string(), "cannot approve aid for a booking that is CANCELLED");
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn forbidden_names_role_and_permission() {
        let err = BookingError::Forbidden {
            role: Role::Owner,
            permission: Permission::CreateBooking,
        };
        assert_eq!(err.to_string(), "OWNER accounts may not create bookings");
    }

    #[test]
    fn not_found_formats_resource() {
        let err = BookingError::not_found("booking", "abc");
        assert_eq!(err.to_string(), "booking abc not found");
    }
}
