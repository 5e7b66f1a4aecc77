//! Razorpay payment gateway.
//!
//! Orders are opened through the Orders API with basic auth (key id and key
//! secret). Checkout confirmations are verified locally: Razorpay signs
//! `"{order_id}|{payment_id}"` with the key secret, so no second API call is
//! needed.

use crate::payment_gateway::{
    GatewayError, GatewayOrder, GatewayResult, PaymentConfirmation, PaymentGateway, signature,
};
use crate::types::Money;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";

/// Razorpay API client.
#[derive(Clone)]
pub struct RazorpayGateway {
    http_client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: u64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    description: String,
}

impl RazorpayGateway {
    /// Client for `base_url` authenticated with the given key pair.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unreachable`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    async fn open_order(
        &self,
        amount: Money,
        currency: String,
        receipt: String,
    ) -> GatewayResult<GatewayOrder> {
        let request = CreateOrderRequest {
            amount: amount.paise(),
            currency: &currency,
            receipt: &receipt,
            payment_capture: 1,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.description)
                .unwrap_or(body);
            tracing::error!(%status, %description, "Razorpay order creation failed");
            return Err(GatewayError::Rejected(description));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        tracing::info!(order_id = %order.id, amount = order.amount, "Razorpay order created");

        Ok(GatewayOrder {
            order_id: order.id,
            amount: Money::from_paise(order.amount),
            currency: order.currency,
            receipt: order.receipt.unwrap_or(receipt),
        })
    }
}

impl PaymentGateway for RazorpayGateway {
    fn create_order(
        &self,
        amount: Money,
        currency: String,
        receipt: String,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewayOrder>> + Send + '_>> {
        Box::pin(self.open_order(amount, currency, receipt))
    }

    fn verify_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + '_>> {
        Box::pin(async move {
            if signature::verify(
                &self.key_secret,
                &confirmation.order_id,
                &confirmation.payment_id,
                &confirmation.signature,
            ) {
                Ok(())
            } else {
                tracing::warn!(
                    order_id = %confirmation.order_id,
                    payment_id = %confirmation.payment_id,
                    "Razorpay signature mismatch"
                );
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
    fn base_url_loses_trailing_slash() {
        let gateway =
            RazorpayGateway::new("https://api.example.test/", "rzp_test", "s", Duration::from_secs(5))
                .unwrap();
        assert_eq!(gateway.base_url, "https://api.example.test");
        assert!(!format!("{gateway:?}").contains("key_secret"));
    }

    #[test]
    fn order_request_matches_orders_api() {
        let body = serde_json::to_value(CreateOrderRequest {
            amount: 720_000,
            currency: "INR",
            receipt: "order_rcptid_1",
            payment_capture: 1,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "amount": 720_000,
                "currency": "INR",
                "receipt": "order_rcptid_1",
                "payment_capture": 1
            })
        );
    }

    #[tokio::test]
    async fn verifies_with_the_key_secret() {
        let gateway =
            RazorpayGateway::new(DEFAULT_BASE_URL, "rzp_test", "key-secret", Duration::from_secs(5))
                .unwrap();
        let confirmation = PaymentConfirmation {
            order_id: "order_9A33XWu170gUtm".to_string(),
            payment_id: "pay_29QQoUBi66xm2f".to_string(),
            signature: signature::sign("key-secret", "order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f"),
        };

        assert_eq!(gateway.verify_payment(confirmation.clone()).await, Ok(()));

        let forged = PaymentConfirmation {
            payment_id: "pay_other".to_string(),
            ..confirmation
        };
        assert_eq!(
            gateway.verify_payment(forged).await,
            Err(GatewayError::InvalidSignature)
        );
    }
}
