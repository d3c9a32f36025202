//! PayPal Orders v2: client-credentials token, create with intent CAPTURE,
//! capture on return.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{provider_error, PaymentError, PaymentGateway, PaymentOutcome, RedirectTarget, ReturnUrls};
use crate::config::PayPalConfig;
use crate::domain::aggregates::{Order, PaymentMethod};
use crate::domain::value_objects::{Money, PriceBreakdown, Priced};

const PROVIDER: &str = "PayPal";
const MAX_ITEM_NAME: usize = 120;

#[derive(Clone)]
pub struct PayPalGateway {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    api_base: String,
    currency: String,
}

#[derive(Debug, Serialize)]
pub struct OrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit>,
    application_context: ApplicationContext,
}

#[derive(Debug, Serialize)]
struct PurchaseUnit {
    reference_id: String,
    amount: Amount,
    items: Vec<Item>,
}

#[derive(Debug, Serialize)]
struct Amount {
    currency_code: String,
    value: String,
    breakdown: Breakdown,
}

#[derive(Debug, Serialize)]
struct Breakdown {
    item_total: Value,
    shipping: Value,
}

#[derive(Debug, Serialize)]
struct Value {
    currency_code: String,
    value: String,
}

impl From<&Money> for Value {
    fn from(money: &Money) -> Self {
        Self { currency_code: money.currency().to_uppercase(), value: money.to_decimal_string() }
    }
}

#[derive(Debug, Serialize)]
struct Item {
    name: String,
    unit_amount: Value,
    quantity: String,
}

#[derive(Debug, Serialize)]
struct ApplicationContext {
    return_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

impl PayPalGateway {
    pub fn new(config: &PayPalConfig, currency: &str) -> Self {
        Self::with_base(config, config.api_base(), currency)
    }

    pub fn with_base(config: &PayPalConfig, api_base: &str, currency: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
            currency: currency.to_uppercase(),
        }
    }

    fn value(&self, minor: i64) -> Value {
        Value::from(&Money::from_minor(minor, &self.currency))
    }

    /// Item total and shipping are the same minor-unit figures the order was
    /// priced with, so the breakdown always sums to the amount.
    pub fn order_request(&self, order: &Order, price: &PriceBreakdown, urls: &ReturnUrls) -> OrderRequest {
        let items = order
            .items()
            .iter()
            .map(|item| {
                let name = if item.name.trim().is_empty() { "Product" } else { item.name.as_str() };
                Item {
                    name: name.chars().take(MAX_ITEM_NAME).collect(),
                    unit_amount: Value::from(&Money::from_amount(item.unit_price(), &self.currency)),
                    quantity: item.billable_quantity().to_string(),
                }
            })
            .collect();
        OrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                reference_id: order.id().to_string(),
                amount: Amount {
                    currency_code: self.currency.clone(),
                    value: Money::from_minor(price.total_minor(), &self.currency).to_decimal_string(),
                    breakdown: Breakdown { item_total: self.value(price.items_minor), shipping: self.value(price.shipping_minor) },
                },
                items,
            }],
            application_context: ApplicationContext { return_url: urls.success.clone(), cancel_url: urls.cancel.clone() },
        }
    }

    #[instrument(skip(self))]
    async fn access_token(&self) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    #[instrument(skip(self, order, price, urls), fields(order_id = %order.id()))]
    async fn create_checkout(&self, order: &Order, price: &PriceBreakdown, urls: &ReturnUrls) -> Result<RedirectTarget, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(&self.order_request(order, price, urls))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        let created: OrderResponse = response.json().await?;
        let approve = created
            .links
            .into_iter()
            .find(|l| l.rel == "approve")
            .ok_or_else(|| PaymentError::InvalidResponse { provider: PROVIDER, message: "no approve link".into() })?;
        debug!(paypal_order = %created.id, "Created PayPal order");
        Ok(RedirectTarget { url: approve.href, provider_ref: created.id })
    }

    #[instrument(skip(self))]
    async fn capture(&self, paypal_order_id: &str) -> Result<PaymentOutcome, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders/{paypal_order_id}/capture", self.api_base))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        let captured: OrderResponse = response.json().await?;
        Ok(if captured.status.as_deref() == Some("COMPLETED") { PaymentOutcome::Settled } else { PaymentOutcome::Failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayPalMode;
    use crate::domain::aggregates::OrderItem;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_breakdown_sums_to_total() {
        let config = PayPalConfig { client_id: "id".into(), client_secret: SecretString::from("s"), mode: PayPalMode::Sandbox };
        let gateway = PayPalGateway::new(&config, "usd");
        let long_name = "x".repeat(200);
        let items: Vec<OrderItem> = vec![
            serde_json::from_value(json!({ "productId": "A", "name": long_name, "price": 0.1, "quantity": 3 })).unwrap(),
            serde_json::from_value(json!({ "productId": "B", "name": "Stand", "price": 0.2 })).unwrap(),
        ];
        let price = PriceBreakdown::compute(&items, 100).unwrap();
        let order = Order::place("U1", items, json!({}), PaymentMethod::PayPal, &price, Utc::now()).unwrap();
        let body = serde_json::to_value(gateway.order_request(&order, &price, &ReturnUrls::for_order("https://s.test", order.id()))).unwrap();

        let amount = &body["purchase_units"][0]["amount"];
        assert_eq!(body["intent"], "CAPTURE");
        assert_eq!(amount["currency_code"], "USD");
        assert_eq!(amount["value"], "1.50");
        assert_eq!(amount["breakdown"]["item_total"]["value"], "0.50");
        assert_eq!(amount["breakdown"]["shipping"]["value"], "1.00");
        let items = body["purchase_units"][0]["items"].as_array().unwrap();
        assert_eq!(items[0]["name"].as_str().unwrap().chars().count(), 120);
        assert_eq!(items[0]["unit_amount"]["value"], "0.10");
        assert_eq!(items[1]["quantity"], "1");
        assert!(body["application_context"]["return_url"].as_str().unwrap().contains("success=true"));
    }
}
