//! Checkout for cash on delivery and hosted card payments

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::lifecycle::OrderService;
use super::publisher::{publish_all, EventPublisher};
use super::stock::{apply_delta, StockSign};
use crate::domain::aggregates::{Order, OrderError, OrderItem, PaymentMethod};
use crate::domain::value_objects::PriceBreakdown;
use crate::error::{Result, StoreError};
use crate::payments::{PaymentError, PaymentGateway, PaymentOutcome, ReturnUrls};
use crate::storage::{CartRepository, OrderRepository, ProductRepository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutResult {
    Placed { order_id: Uuid },
    Redirect { order_id: Uuid, url: String },
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    carts: Arc<dyn CartRepository>,
    events: Arc<dyn EventPublisher>,
    lifecycle: OrderService,
    stripe: Option<Arc<dyn PaymentGateway>>,
    paypal: Option<Arc<dyn PaymentGateway>>,
    delivery_charge_minor: i64,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        carts: Arc<dyn CartRepository>,
        events: Arc<dyn EventPublisher>,
        delivery_charge_minor: i64,
    ) -> Self {
        let lifecycle = OrderService::new(orders.clone(), products.clone(), carts.clone(), events.clone());
        Self { orders, products, carts, events, lifecycle, stripe: None, paypal: None, delivery_charge_minor }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        match gateway.method() {
            PaymentMethod::Stripe => self.stripe = Some(gateway),
            PaymentMethod::PayPal => self.paypal = Some(gateway),
            PaymentMethod::Cod => {}
        }
        self
    }

    fn gateway(&self, method: PaymentMethod) -> Result<&Arc<dyn PaymentGateway>> {
        let gateway = match method {
            PaymentMethod::Stripe => self.stripe.as_ref(),
            PaymentMethod::PayPal => self.paypal.as_ref(),
            PaymentMethod::Cod => None,
        };
        gateway.ok_or_else(|| PaymentError::Unavailable(method.as_str()).into())
    }

    pub fn price(&self, items: &[OrderItem]) -> Result<PriceBreakdown> {
        PriceBreakdown::compute(items, self.delivery_charge_minor).ok_or_else(|| OrderError::OutOfRange.into())
    }

    /// Persists a new unpaid order, then settles it (COD) or opens a hosted
    /// checkout. A provider failure leaves the persisted order in place.
    #[instrument(skip(self, items, address), fields(method = method.as_str(), lines = items.len()))]
    pub async fn place(
        &self,
        user_id: &str,
        items: Vec<OrderItem>,
        address: Value,
        method: PaymentMethod,
        origin: &str,
    ) -> Result<CheckoutResult> {
        let gateway = match method {
            PaymentMethod::Cod => None,
            card => Some(self.gateway(card)?.clone()),
        };
        let price = self.price(&items)?;
        let mut order = Order::place(user_id, items, address, method, &price, Utc::now())?;
        self.orders.insert(&order).await?;
        publish_all(self.events.as_ref(), order.take_events()).await;
        let order_id = order.id();
        info!(%order_id, total_minor = price.total_minor(), "Order placed");

        match gateway {
            None => {
                apply_delta(self.products.as_ref(), order.items(), StockSign::Decrement).await?;
                self.carts.clear(user_id).await?;
                Ok(CheckoutResult::Placed { order_id })
            }
            Some(gateway) => {
                let urls = ReturnUrls::for_order(origin, order_id);
                let target = gateway.create_checkout(&order, &price, &urls).await?;
                info!(%order_id, provider_ref = %target.provider_ref, "Hosted checkout created");
                Ok(CheckoutResult::Redirect { order_id, url: target.url })
            }
        }
    }

    /// With a session id the provider is asked; otherwise the reported flag decides.
    #[instrument(skip(self, session_id), fields(order_id = %order_id))]
    pub async fn verify_stripe(&self, user_id: &str, order_id: Uuid, success: bool, session_id: Option<&str>) -> Result<bool> {
        let outcome = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(session) => self.gateway(PaymentMethod::Stripe)?.capture(session).await?,
            None if success => PaymentOutcome::Settled,
            None => PaymentOutcome::Failed,
        };
        self.lifecycle.apply_payment(user_id, order_id, outcome).await
    }

    /// A cancelled approval or a capture PayPal refuses (4xx) fails the
    /// payment; transport and server errors are reported to the caller.
    #[instrument(skip(self, token), fields(order_id = %order_id))]
    pub async fn verify_paypal(&self, user_id: &str, order_id: Uuid, approved: bool, token: &str) -> Result<bool> {
        let outcome = if !approved {
            PaymentOutcome::Failed
        } else {
            if token.trim().is_empty() {
                return Err(StoreError::InvalidInput("token is required".into()));
            }
            match self.gateway(PaymentMethod::PayPal)?.capture(token.trim()).await {
                Ok(outcome) => outcome,
                Err(PaymentError::Provider { status, message, .. }) if (400..500).contains(&status) => {
                    warn!(%order_id, status, %message, "PayPal refused capture");
                    PaymentOutcome::Failed
                }
                Err(e) => return Err(e.into()),
            }
        };
        self.lifecycle.apply_payment(user_id, order_id, outcome).await
    }
}
