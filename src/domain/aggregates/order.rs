//! Order Aggregate
//!
//! Owns the order status and the legal moves between statuses. Every guard
//! lives here so the services only load, call, save.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{to_decimal, PriceBreakdown, Priced};
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    user_id: String,
    items: Vec<OrderItem>,
    address: Value,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    number_of_items: u32,
    payment_method: PaymentMethod,
    payment: bool,
    status: OrderStatus,
    date: DateTime<Utc>,
    #[serde(default)]
    cancellation: Option<Cancellation>,
    #[serde(default)]
    refund_request: Option<RefundRequest>,
    #[serde(default)]
    user_confirmed: bool,
    #[serde(default)]
    received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    delivered_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// A line as submitted by the storefront. Unknown fields (size, image, ...)
/// are carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawOrderItem", into = "RawOrderItem")]
pub struct OrderItem {
    pub product_id: Option<String>,
    pub name: String,
    pub price: f64,
    pub quantity: Option<u32>,
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RawOrderItem {
    #[serde(rename = "productId", default, skip_serializing_if = "Option::is_none")]
    product_id: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    legacy_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quantity: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn id_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }.filter(|n: &f64| n.is_finite())
}

/// A line without a quantity is one unit. A quantity that is present but not
/// a positive whole number is kept in `extra` so it survives a reload.
impl From<RawOrderItem> for OrderItem {
    fn from(raw: RawOrderItem) -> Self {
        let product_id = [&raw.product_id, &raw.legacy_id, &raw.id].into_iter().flatten().find_map(id_text);
        let mut extra = raw.extra;
        let quantity = match raw.quantity {
            None | Some(Value::Null) => Some(1),
            Some(v) => {
                let q = number(&v)
                    .filter(|q| *q > 0.0 && q.fract() == 0.0 && *q <= f64::from(u32::MAX))
                    .map(|q| q as u32);
                if q.is_none() { extra.insert("quantity".into(), v); }
                q
            }
        };
        Self {
            product_id,
            name: raw.name.unwrap_or_default(),
            price: raw.price.as_ref().and_then(number).unwrap_or(0.0),
            quantity,
            extra,
        }
    }
}

impl From<OrderItem> for RawOrderItem {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id.map(Value::String),
            name: Some(item.name),
            price: serde_json::Number::from_f64(item.price).map(Value::Number),
            quantity: item.quantity.map(Value::from),
            extra: item.extra,
            ..Default::default()
        }
    }
}

impl Priced for OrderItem {
    fn unit_price(&self) -> f64 { self.price }
    fn quantity(&self) -> Option<u32> { self.quantity }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD")] Cod,
    Stripe,
    PayPal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cod => "COD", Self::Stripe => "Stripe", Self::PayPal => "PayPal" }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Placed,
    Paid,
    Packing,
    Shipped,
    #[serde(rename = "Out for delivery")] OutForDelivery,
    Delivered,
    Completed,
    Cancelled,
    #[serde(rename = "Refund Requested")] RefundRequested,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        Self::Placed, Self::Paid, Self::Packing, Self::Shipped, Self::OutForDelivery,
        Self::Delivered, Self::Completed, Self::Cancelled, Self::RefundRequested,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Placed => "Placed",
            Self::Paid => "Paid",
            Self::Packing => "Packing",
            Self::Shipped => "Shipped",
            Self::OutForDelivery => "Out for delivery",
            Self::Delivered => "Delivered",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::RefundRequested => "Refund Requested",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Placed => matches!(next, Paid | Packing | Shipped | OutForDelivery | Delivered | Cancelled),
            Paid => matches!(next, Packing | Shipped | OutForDelivery | Delivered | Cancelled),
            Packing => matches!(next, Shipped | OutForDelivery | Delivered | Cancelled),
            Shipped => matches!(next, OutForDelivery | Delivered | Cancelled),
            OutForDelivery => matches!(next, Delivered | Cancelled),
            Delivered => matches!(next, Completed | RefundRequested),
            Completed | Cancelled | RefundRequested => false,
        }
    }

    /// Statuses from which `target` is reachable in one move.
    pub fn predecessors(target: OrderStatus) -> Vec<OrderStatus> {
        Self::ALL.into_iter().filter(|s| s.can_transition_to(target)).collect()
    }

    /// The order has reached the customer at some point.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered | Self::Completed | Self::RefundRequested)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, OrderError> {
        let key: String = s.trim().to_lowercase().chars().filter(|c| c.is_alphanumeric()).collect();
        let status = match key.as_str() {
            "placed" | "orderplaced" => Self::Placed,
            "paid" => Self::Paid,
            "packing" => Self::Packing,
            "shipped" => Self::Shipped,
            "outfordelivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            "refundrequested" => Self::RefundRequested,
            _ => return Err(OrderError::UnknownStatus(s.trim().to_string())),
        };
        Ok(status)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation { pub reason: String, pub at: DateTime<Utc> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundStatus { #[default] Pending, Approved, Rejected, Refunded }

impl FromStr for RefundStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, OrderError> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "refunded" => Ok(Self::Refunded),
            _ => Err(OrderError::UnknownStatus(s.trim().to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub reason: String,
    pub other_reason: String,
    pub images: Vec<String>,
    pub video: Option<String>,
    pub status: RefundStatus,
    pub requested_at: DateTime<Utc>,
}

/// Evidence and reasons for a refund; media already stored.
#[derive(Clone, Debug, Default)]
pub struct RefundClaim { pub reason: String, pub other_reason: String, pub images: Vec<String>, pub video: Option<String> }

/// Outcome of a guarded operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition { Applied, Unchanged }

impl Transition {
    pub fn is_applied(&self) -> bool { matches!(self, Self::Applied) }
}

impl Order {
    pub fn place(
        user_id: impl Into<String>, items: Vec<OrderItem>, address: Value,
        method: PaymentMethod, price: &PriceBreakdown, now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let number_of_items = items
            .iter()
            .try_fold(0u32, |acc, i| acc.checked_add(i.quantity.unwrap_or(1)))
            .ok_or(OrderError::OutOfRange)?;
        let mut order = Self {
            id: Uuid::now_v7(), user_id: user_id.into(), items, address,
            amount: to_decimal(price.total_minor()), number_of_items,
            payment_method: method, payment: false, status: OrderStatus::Placed, date: now,
            cancellation: None, refund_request: None, user_confirmed: false,
            received_at: None, delivered_at: None, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, user_id: order.user_id.clone(),
            amount_minor: price.total_minor(), method: method.as_str().to_string(),
        }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn address(&self) -> &Value { &self.address }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn number_of_items(&self) -> u32 { self.number_of_items }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn is_paid(&self) -> bool { self.payment }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn date(&self) -> DateTime<Utc> { self.date }
    pub fn cancellation(&self) -> Option<&Cancellation> { self.cancellation.as_ref() }
    pub fn refund_request(&self) -> Option<&RefundRequest> { self.refund_request.as_ref() }
    pub fn is_confirmed(&self) -> bool { self.user_confirmed }
    pub fn received_at(&self) -> Option<DateTime<Utc>> { self.received_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_owned_by(&self, user_id: &str) -> bool { self.user_id == user_id }

    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        if self.status.is_delivered() { return Err(OrderError::AlreadyDelivered); }
        if self.status == OrderStatus::Cancelled { return Ok(Transition::Unchanged); }
        let reason = reason.into();
        self.status = OrderStatus::Cancelled;
        self.cancellation = Some(Cancellation { reason: reason.clone(), at: now });
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id, reason }));
        Ok(Transition::Applied)
    }

    pub fn confirm_received(&mut self, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        if self.status == OrderStatus::Cancelled { return Err(OrderError::AlreadyCancelled); }
        if self.user_confirmed || self.status == OrderStatus::Completed { return Ok(Transition::Unchanged); }
        match self.status {
            OrderStatus::Delivered => {}
            OrderStatus::RefundRequested => return Err(OrderError::IllegalTransition { from: self.status, to: OrderStatus::Completed }),
            _ => return Err(OrderError::NotDelivered),
        }
        self.status = OrderStatus::Completed;
        self.user_confirmed = true;
        self.received_at = Some(now);
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::Completed { order_id: self.id }));
        Ok(Transition::Applied)
    }

    /// `Ok(Unchanged)` when a refund already exists; nothing new may be stored then.
    pub fn check_refundable(&self) -> Result<Transition, OrderError> {
        if !self.status.is_delivered() { return Err(OrderError::NotDelivered); }
        if self.refund_request.is_some() { return Ok(Transition::Unchanged); }
        Ok(Transition::Applied)
    }

    pub fn request_refund(&mut self, claim: RefundClaim, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        if !self.check_refundable()?.is_applied() { return Ok(Transition::Unchanged); }
        self.refund_request = Some(RefundRequest {
            reason: claim.reason, other_reason: claim.other_reason, images: claim.images,
            video: claim.video, status: RefundStatus::Pending, requested_at: now,
        });
        if self.status == OrderStatus::Delivered { self.status = OrderStatus::RefundRequested; }
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::RefundRequested { order_id: self.id }));
        Ok(Transition::Applied)
    }

    pub fn resolve_refund(&mut self, status: RefundStatus, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        let refund = self.refund_request.as_mut().ok_or(OrderError::NoRefundRequest)?;
        if refund.status == status { return Ok(Transition::Unchanged); }
        refund.status = status;
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::RefundResolved { order_id: self.id, status: format!("{status:?}") }));
        Ok(Transition::Applied)
    }

    /// Admin move along the fulfilment table.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        if self.status == next { return Ok(Transition::Unchanged); }
        if !self.status.can_transition_to(next) { return Err(OrderError::IllegalTransition { from: self.status, to: next }); }
        let from = self.status;
        self.status = next;
        if next == OrderStatus::Delivered { self.delivered_at = Some(now); }
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: self.id, from: from.label().to_string(), to: next.label().to_string(),
        }));
        Ok(Transition::Applied)
    }

    pub fn settle_payment(&mut self, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        if self.payment { return Ok(Transition::Unchanged); }
        if self.status == OrderStatus::Cancelled { return Err(OrderError::AlreadyCancelled); }
        self.payment = true;
        if self.status == OrderStatus::Placed { self.status = OrderStatus::Paid; }
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(Transition::Applied)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    NoItems,
    AlreadyDelivered,
    AlreadyCancelled,
    NotDelivered,
    NoRefundRequest,
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    UnknownStatus(String),
    OutOfRange,
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order has no items"),
            Self::AlreadyDelivered => write!(f, "Order already delivered, cannot cancel"),
            Self::AlreadyCancelled => write!(f, "Order cancelled"),
            Self::NotDelivered => write!(f, "Order not delivered yet"),
            Self::NoRefundRequest => write!(f, "No refund request on this order"),
            Self::IllegalTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "Unknown status '{s}'"),
            Self::OutOfRange => write!(f, "Order quantities or amount out of range"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(price: f64, qty: u32) -> OrderItem {
        serde_json::from_value(json!({ "productId": "P1", "name": "Widget", "price": price, "quantity": qty })).unwrap()
    }

    fn placed() -> Order {
        let items = vec![item(10.0, 2)];
        let price = PriceBreakdown::compute(&items, 100).unwrap();
        Order::place("U1", items, json!({ "city": "Hanoi" }), PaymentMethod::Cod, &price, Utc::now()).unwrap()
    }

    fn delivered() -> Order {
        let mut order = placed();
        order.transition_to(OrderStatus::Delivered, Utc::now()).unwrap();
        order
    }

    #[test]
    fn test_place_computes_amount_once() {
        let order = placed();
        assert_eq!(order.amount().to_string(), "21.00");
        assert_eq!(order.number_of_items(), 2);
        assert_eq!(order.status(), OrderStatus::Placed);
        assert!(!order.is_paid());
        let price = PriceBreakdown::compute(&Vec::<OrderItem>::new(), 100).unwrap();
        assert_eq!(Order::place("U1", vec![], Value::Null, PaymentMethod::Cod, &price, Utc::now()).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_place_rejects_item_count_overflow() {
        let items = vec![item(0.0, u32::MAX), item(0.0, 2)];
        let price = PriceBreakdown::compute(&items, 0).unwrap();
        assert_eq!(Order::place("U1", items, Value::Null, PaymentMethod::Cod, &price, Utc::now()).unwrap_err(), OrderError::OutOfRange);
    }

    #[test]
    fn test_missing_quantity_is_one_unit() {
        let a: OrderItem = serde_json::from_value(json!({ "productId": "P1", "price": 10 })).unwrap();
        assert_eq!(a.quantity, Some(1));
        let b: OrderItem = serde_json::from_value(json!({ "productId": "P1", "price": 10, "quantity": null })).unwrap();
        assert_eq!(b.quantity, Some(1));

        let bad: OrderItem = serde_json::from_value(json!({ "productId": "P1", "quantity": "lots" })).unwrap();
        assert_eq!(bad.quantity, None);
        let reloaded: OrderItem = serde_json::from_value(serde_json::to_value(&bad).unwrap()).unwrap();
        assert_eq!(reloaded.quantity, None);
        assert_eq!(reloaded.extra["quantity"], "lots");
    }

    #[test]
    fn test_item_tolerates_legacy_fields() {
        let a: OrderItem = serde_json::from_value(json!({ "_id": "abc", "id": "zzz", "price": "4.50", "quantity": "3", "size": "M" })).unwrap();
        assert_eq!(a.product_id.as_deref(), Some("abc"));
        assert_eq!(a.price, 4.5);
        assert_eq!(a.quantity, Some(3));
        assert_eq!(a.extra["size"], "M");
        let b: OrderItem = serde_json::from_value(json!({ "name": "X", "price": 1, "quantity": -2 })).unwrap();
        assert_eq!(b.product_id, None);
        assert_eq!(b.quantity, None);
        let c: OrderItem = serde_json::from_value(json!({ "productId": "p", "quantity": 1.5 })).unwrap();
        assert_eq!(c.quantity, None);
        let back = serde_json::to_value(&a).unwrap();
        assert_eq!(back["productId"], "abc");
        assert_eq!(back["size"], "M");
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut order = placed();
        order.take_events();
        assert_eq!(order.cancel("changed mind", Utc::now()).unwrap(), Transition::Applied);
        assert_eq!(order.cancel("again", Utc::now()).unwrap(), Transition::Unchanged);
        assert_eq!(order.cancellation().unwrap().reason, "changed mind");
        assert_eq!(order.take_events().len(), 1);
    }

    #[test]
    fn test_cancel_blocked_after_delivery() {
        let mut order = delivered();
        assert_eq!(order.cancel("late", Utc::now()).unwrap_err(), OrderError::AlreadyDelivered);
        order.confirm_received(Utc::now()).unwrap();
        assert_eq!(order.cancel("late", Utc::now()).unwrap_err(), OrderError::AlreadyDelivered);
    }

    #[test]
    fn test_confirm_received_rules() {
        let mut order = placed();
        assert_eq!(order.confirm_received(Utc::now()).unwrap_err(), OrderError::NotDelivered);
        let mut order2 = delivered();
        assert_eq!(order2.confirm_received(Utc::now()).unwrap(), Transition::Applied);
        assert_eq!(order2.confirm_received(Utc::now()).unwrap(), Transition::Unchanged);
        assert_eq!(order2.status(), OrderStatus::Completed);
        assert!(order2.is_confirmed());
        order.cancel("x", Utc::now()).unwrap();
        assert_eq!(order.confirm_received(Utc::now()).unwrap_err(), OrderError::AlreadyCancelled);
    }

    #[test]
    fn test_refund_requires_delivery_and_is_idempotent() {
        let mut order = placed();
        let claim = RefundClaim { reason: "broken".into(), ..Default::default() };
        assert_eq!(order.request_refund(claim.clone(), Utc::now()).unwrap_err(), OrderError::NotDelivered);

        let mut order = delivered();
        assert_eq!(order.request_refund(claim.clone(), Utc::now()).unwrap(), Transition::Applied);
        assert_eq!(order.status(), OrderStatus::RefundRequested);
        assert_eq!(order.refund_request().unwrap().status, RefundStatus::Pending);
        let second = RefundClaim { reason: "other".into(), ..Default::default() };
        assert_eq!(order.request_refund(second, Utc::now()).unwrap(), Transition::Unchanged);
        assert_eq!(order.refund_request().unwrap().reason, "broken");
    }

    #[test]
    fn test_refund_after_completion_keeps_status() {
        let mut order = delivered();
        order.confirm_received(Utc::now()).unwrap();
        order.request_refund(RefundClaim { reason: "r".into(), ..Default::default() }, Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.resolve_refund(RefundStatus::Approved, Utc::now()).unwrap(), Transition::Applied);
        assert_eq!(order.refund_request().unwrap().status, RefundStatus::Approved);
        assert_eq!(placed().resolve_refund(RefundStatus::Approved, Utc::now()).unwrap_err(), OrderError::NoRefundRequest);
    }

    #[test]
    fn test_transition_table() {
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Placed));
        assert!(OrderStatus::ALL.iter().all(|s| !OrderStatus::Completed.can_transition_to(*s)));
        assert_eq!(OrderStatus::predecessors(OrderStatus::Completed), vec![OrderStatus::Delivered]);
        let mut order = placed();
        assert!(matches!(order.transition_to(OrderStatus::Completed, Utc::now()), Err(OrderError::IllegalTransition { .. })));
        order.transition_to(OrderStatus::Delivered, Utc::now()).unwrap();
        assert!(order.delivered_at().is_some());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Order Placed".parse::<OrderStatus>().unwrap(), OrderStatus::Placed);
        assert_eq!("out for delivery".parse::<OrderStatus>().unwrap(), OrderStatus::OutForDelivery);
        assert_eq!("REFUND_REQUESTED".parse::<OrderStatus>().unwrap(), OrderStatus::RefundRequested);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_value(OrderStatus::OutForDelivery).unwrap(), "Out for delivery");
    }

    #[test]
    fn test_settle_payment() {
        let mut order = placed();
        assert_eq!(order.settle_payment(Utc::now()).unwrap(), Transition::Applied);
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.settle_payment(Utc::now()).unwrap(), Transition::Unchanged);
        let mut cancelled = placed();
        cancelled.cancel("x", Utc::now()).unwrap();
        assert_eq!(cancelled.settle_payment(Utc::now()).unwrap_err(), OrderError::AlreadyCancelled);
    }

    #[test]
    fn test_document_round_trip_keeps_state() {
        let mut order = delivered();
        order.request_refund(RefundClaim { reason: "r".into(), images: vec!["/uploads/refunds/a.png".into()], ..Default::default() }, Utc::now()).unwrap();
        let doc = serde_json::to_value(&order).unwrap();
        assert_eq!(doc["amount"], json!(21.0));
        assert_eq!(doc["paymentMethod"], "COD");
        let restored: Order = serde_json::from_value(doc).unwrap();
        assert_eq!(restored.status(), OrderStatus::RefundRequested);
        assert_eq!(restored.refund_request().unwrap().images.len(), 1);
    }
}
