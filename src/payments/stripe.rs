//! Stripe hosted checkout sessions (form-encoded REST API).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{provider_error, PaymentError, PaymentGateway, PaymentOutcome, RedirectTarget, ReturnUrls};
use crate::config::StripeConfig;
use crate::domain::aggregates::{Order, PaymentMethod};
use crate::domain::value_objects::{to_minor_units, PriceBreakdown, Priced};

const PROVIDER: &str = "Stripe";

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: SecretString,
    api_base: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct Session {
    id: String,
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig, currency: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            currency: currency.to_lowercase(),
        }
    }

    /// One line per order item plus the delivery charge; amounts in minor units.
    pub fn session_form(&self, order: &Order, price: &PriceBreakdown, urls: &ReturnUrls) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), format!("{}&session_id={{CHECKOUT_SESSION_ID}}", urls.success)),
            ("cancel_url".to_string(), urls.cancel.clone()),
            ("client_reference_id".to_string(), order.id().to_string()),
        ];
        let mut push_line = |i: usize, name: &str, unit_amount: i64, quantity: u32| {
            form.push((format!("line_items[{i}][price_data][currency]"), self.currency.clone()));
            form.push((format!("line_items[{i}][price_data][product_data][name]"), name.to_string()));
            form.push((format!("line_items[{i}][price_data][unit_amount]"), unit_amount.to_string()));
            form.push((format!("line_items[{i}][quantity]"), quantity.to_string()));
        };
        let items = order.items();
        for (i, item) in items.iter().enumerate() {
            let name = if item.name.trim().is_empty() { "Product" } else { item.name.as_str() };
            push_line(i, name, to_minor_units(item.unit_price()), item.billable_quantity());
        }
        push_line(items.len(), "Delivery Charges", price.shipping_minor, 1);
        form
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    #[instrument(skip(self, order, price, urls), fields(order_id = %order.id()))]
    async fn create_checkout(&self, order: &Order, price: &PriceBreakdown, urls: &ReturnUrls) -> Result<RedirectTarget, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&self.session_form(order, price, urls))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        let session: Session = response.json().await?;
        let url = session.url.ok_or_else(|| PaymentError::InvalidResponse {
            provider: PROVIDER,
            message: "session has no url".into(),
        })?;
        debug!(session_id = %session.id, "Created checkout session");
        Ok(RedirectTarget { url, provider_ref: session.id })
    }

    #[instrument(skip(self))]
    async fn capture(&self, session_id: &str) -> Result<PaymentOutcome, PaymentError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        let session: Session = response.json().await?;
        Ok(match session.payment_status.as_deref() {
            Some("paid") | Some("no_payment_required") => PaymentOutcome::Settled,
            _ => PaymentOutcome::Failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderItem;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_session_form_adds_delivery_line() {
        let gateway = StripeGateway::new(
            &StripeConfig { secret_key: SecretString::from("sk_test"), api_base: "https://api.stripe.test/".into() },
            "USD",
        );
        let items: Vec<OrderItem> = vec![
            serde_json::from_value(json!({ "productId": "A", "name": "Figure", "price": 19.99, "quantity": 2 })).unwrap(),
            serde_json::from_value(json!({ "productId": "B", "name": "", "price": "5" })).unwrap(),
        ];
        let price = PriceBreakdown::compute(&items, 100).unwrap();
        let order = Order::place("U1", items, json!({}), PaymentMethod::Stripe, &price, Utc::now()).unwrap();
        let urls = ReturnUrls::for_order("https://shop.test", order.id());
        let form: HashMap<String, String> = gateway.session_form(&order, &price, &urls).into_iter().collect();

        assert_eq!(form["line_items[0][price_data][unit_amount]"], "1999");
        assert_eq!(form["line_items[0][quantity]"], "2");
        assert_eq!(form["line_items[1][price_data][product_data][name]"], "Product");
        assert_eq!(form["line_items[1][quantity]"], "1");
        assert_eq!(form["line_items[2][price_data][product_data][name]"], "Delivery Charges");
        assert_eq!(form["line_items[2][price_data][unit_amount]"], "100");
        assert_eq!(form["line_items[2][price_data][currency]"], "usd");
        assert!(form["success_url"].ends_with("&session_id={CHECKOUT_SESSION_ID}"));
        assert_eq!(gateway.api_base, "https://api.stripe.test");
    }
}
