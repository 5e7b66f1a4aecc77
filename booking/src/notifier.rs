//! Booking confirmation notices.
//!
//! Sent as a fire-and-forget effect once a payment confirms a booking. A
//! failed notice is logged and never undoes the confirmation.

use crate::types::{BookingId, Money};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// What a tenant is told when their booking is confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationNotice {
    /// Confirmed booking
    pub booking_id: BookingId,
    /// Tenant's email address
    pub email: String,
    /// Tenant's display name
    pub name: String,
    /// Listing booked
    pub listing_name: String,
    /// Amount paid
    pub amount: Money,
    /// Gateway payment reference
    pub payment_id: String,
}

/// A notice could not be delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for confirmation notices.
pub trait Notifier: Send + Sync {
    /// Deliver `notice`.
    ///
    /// # Errors
    ///
    /// [`NotifyError`] if delivery failed.
    fn booking_confirmed(
        &self,
        notice: ConfirmationNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

/// Writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn booking_confirmed(
        &self,
        notice: ConfirmationNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                booking_id = %notice.booking_id,
                to = %notice.email,
                listing = %notice.listing_name,
                amount = %notice.amount,
                payment_id = %notice.payment_id,
                "📧 Booking confirmation"
            );
            Ok(())
        })
    }
}

/// Keeps every notice in memory for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<ConfirmationNotice>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Notifier that records and succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier that records and then reports failure
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Notices delivered so far
    #[must_use]
    pub fn sent(&self) -> Vec<ConfirmationNotice> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn booking_confirmed(
        &self,
        notice: ConfirmationNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(notice);
            }
            if self.fail {
                Err(NotifyError("mailbox unavailable".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> ConfirmationNotice {
        ConfirmationNotice {
            booking_id: BookingId::new(),
            email: "asha@example.com".to_string(),
            name: "Asha".to_string(),
            listing_name: "Sunrise PG".to_string(),
            amount: Money::from_rupees(7200),
            payment_id: "pay_1".to_string(),
        }
    }

    #[tokio::test]
    async fn recording_notifier_keeps_notices_even_when_failing() {
        let ok = RecordingNotifier::new();
        let broken = RecordingNotifier::failing();

        assert!(ok.booking_confirmed(notice()).await.is_ok());
        assert!(broken.booking_confirmed(notice()).await.is_err());

        assert_eq!(ok.sent().len(), 1);
        assert_eq!(broken.sent().len(), 1);
    }

    #[tokio::test]
    async fn log_notifier_succeeds() {
        assert_eq!(LogNotifier.booking_confirmed(notice()).await, Ok(()));
    }
}
