//! Card payment providers
//!
//! Pricing is done once by the checkout service; a gateway only turns an
//! already-priced order into a hosted checkout and later reports whether the
//! buyer paid.

pub mod paypal;
pub mod stripe;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Order, PaymentMethod};
use crate::domain::value_objects::PriceBreakdown;

pub use paypal::PayPalGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0} checkout is not configured")]
    Unavailable(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Provider { provider: &'static str, status: u16, message: String },

    #[error("Invalid {provider} response: {message}")]
    InvalidResponse { provider: &'static str, message: String },
}

/// Where the storefront sends the buyer after the hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnUrls {
    pub success: String,
    pub cancel: String,
}

impl ReturnUrls {
    pub fn for_order(origin: &str, order_id: Uuid) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            success: format!("{origin}/verify?success=true&orderId={order_id}"),
            cancel: format!("{origin}/verify?success=false&orderId={order_id}"),
        }
    }
}

/// Hosted checkout created by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub url: String,
    /// Provider-side id (Stripe session, PayPal order) used for capture.
    pub provider_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome { Settled, Failed }

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn create_checkout(
        &self,
        order: &Order,
        price: &PriceBreakdown,
        urls: &ReturnUrls,
    ) -> Result<RedirectTarget, PaymentError>;

    async fn capture(&self, provider_ref: &str) -> Result<PaymentOutcome, PaymentError>;
}

/// Reads a provider error body, keeping the message short.
async fn provider_error(provider: &'static str, response: reqwest::Response) -> PaymentError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("error_description"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    PaymentError::Provider { provider, status, message }
}
