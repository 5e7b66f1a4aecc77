//! Payment gateway abstraction.
//!
//! The reducer never talks to a gateway directly. It returns effects that call
//! a [`PaymentGateway`] from the environment and feed the outcome back as an
//! action. [`RazorpayGateway`](crate::razorpay::RazorpayGateway) is the
//! production implementation; [`MockPaymentGateway`] signs and verifies with
//! the same scheme without any network traffic.
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures so the environment can hold an
//! `Arc<dyn PaymentGateway>` chosen at startup.

use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors reported by a payment gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway answered but refused the request
    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    /// The payment signature does not match the order and payment ids
    #[error("payment signature does not match")]
    InvalidSignature,

    /// The gateway could not be reached
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway's response could not be understood
    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

/// Result alias for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// An order opened with the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    /// Gateway order handle, passed to the checkout widget
    pub order_id: String,
    /// Amount in paise
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Receipt reference
    pub receipt: String,
}

/// What the checkout widget hands back after a successful payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    /// Order the payment settles
    pub order_id: String,
    /// Gateway payment reference
    pub payment_id: String,
    /// Hex HMAC-SHA256 of `"{order_id}|{payment_id}"`
    #[serde(default)]
    pub signature: String,
}

/// External payment processor.
pub trait PaymentGateway: Send + Sync {
    /// Open an order for `amount`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Rejected`], [`GatewayError::Unreachable`] or
    /// [`GatewayError::Malformed`] depending on how the call failed.
    fn create_order(
        &self,
        amount: Money,
        currency: String,
        receipt: String,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewayOrder>> + Send + '_>>;

    /// Check that `confirmation` was issued by the gateway.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidSignature`] when the signature does not verify.
    fn verify_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + '_>>;
}

/// Razorpay's checkout signature scheme.
pub mod signature {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use std::fmt::Write;

    type HmacSha256 = Hmac<Sha256>;

    /// Lowercase hex HMAC-SHA256 of `"{order_id}|{payment_id}"` under `secret`.
    #[must_use]
    pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        // HMAC accepts keys of any length
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return String::new();
        };
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());

        mac.finalize()
            .into_bytes()
            .iter()
            .fold(String::with_capacity(64), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }

    /// Constant-time comparison of `signature` against the expected one.
    #[must_use]
    pub fn verify(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = sign(secret, order_id, payment_id);
        !expected.is_empty()
            && constant_time_eq::constant_time_eq(
                expected.as_bytes(),
                signature.trim().to_ascii_lowercase().as_bytes(),
            )
    }
}

/// In-process gateway for development and tests.
///
/// Orders are numbered `order_mock_1`, `order_mock_2`, ... and signatures are
/// checked with [`signature::verify`] under the configured secret.
#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
    secret: String,
    fail_orders: bool,
    counter: Arc<AtomicU64>,
}

impl MockPaymentGateway {
    /// Gateway that accepts every order
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            fail_orders: false,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Gateway whose order creation always fails
    #[must_use]
    pub fn failing(secret: impl Into<String>) -> Self {
        Self {
            fail_orders: true,
            ..Self::new(secret)
        }
    }

    /// Sign a payment the way the checkout widget would.
    #[must_use]
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        signature::sign(&self.secret, order_id, payment_id)
    }

    /// A correctly signed confirmation for `order_id`.
    #[must_use]
    pub fn confirm(&self, order_id: &str, payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            signature: self.sign(order_id, payment_id),
        }
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_order(
        &self,
        amount: Money,
        currency: String,
        receipt: String,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewayOrder>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_orders {
                return Err(GatewayError::Unreachable("mock gateway is down".to_string()));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(GatewayOrder {
                order_id: format!("order_mock_{n}"),
                amount,
                currency,
                receipt,
            })
        })
    }

    fn verify_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + '_>> {
        Box::pin(async move {
            if signature::verify(
                &self.secret,
                &confirmation.order_id,
                &confirmation.payment_id,
                &confirmation.signature,
            ) {
                Ok(())
            } else {
                Err(GatewayError::InvalidSignature)
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_lowercase_hex_and_case_insensitive() {
        let sig = signature::sign("secret", "order_1", "pay_1");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(signature::verify("secret", "order_1", "pay_1", &sig));
        assert!(signature::verify("secret", "order_1", "pay_1", &sig.to_uppercase()));
    }

    #[test]
    fn signature_binds_both_ids_and_the_secret() {
        let sig = signature::sign("secret", "order_1", "pay_1");
        assert!(!signature::verify("secret", "order_1", "pay_2", &sig));
        assert!(!signature::verify("secret", "order_2", "pay_1", &sig));
        assert!(!signature::verify("other", "order_1", "pay_1", &sig));
        assert!(!signature::verify("secret", "order_1", "pay_1", ""));
    }

    #[tokio::test]
    async fn mock_numbers_orders_and_verifies_its_own_signatures() {
        let gateway = MockPaymentGateway::new("test-secret");

        let first = gateway
            .create_order(Money::from_rupees(7200), "INR".into(), "order_rcptid_a".into())
            .await
            .unwrap();
        let second = gateway
            .create_order(Money::from_rupees(9000), "INR".into(), "order_rcptid_b".into())
            .await
            .unwrap();
        assert_eq!(first.order_id, "order_mock_1");
        assert_eq!(second.order_id, "order_mock_2");
        assert_eq!(first.amount, Money::from_rupees(7200));

        let good = gateway.confirm(&first.order_id, "pay_123");
        assert_eq!(gateway.verify_payment(good.clone()).await, Ok(()));

        let forged = PaymentConfirmation {
            signature: "00".repeat(32),
            ..good
        };
        assert_eq!(
            gateway.verify_payment(forged).await,
            Err(GatewayError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn failing_mock_refuses_orders() {
        let gateway = MockPaymentGateway::failing("s");
        let result = gateway
            .create_order(Money::from_rupees(1), "INR".into(), "r".into())
            .await;
        assert!(matches!(result, Err(GatewayError::Unreachable(_))));
    }
}
