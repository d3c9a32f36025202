//! Order lifecycle service
//!
//! Load, apply the aggregate's guard, save, then side effects (stock, cart,
//! events). No locking: concurrent writers race on read-modify-write.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::publisher::{publish_all, EventPublisher};
use super::stock::{apply_delta, StockSign};
use crate::domain::aggregates::{Order, OrderStatus, RefundClaim, RefundStatus, Transition};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::error::{Result, StoreError};
use crate::payments::PaymentOutcome;
use crate::storage::{CartRepository, OrderRepository, ProductRepository};

pub(crate) fn parse_order_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| StoreError::InvalidInput(format!("Invalid order id '{}'", raw.trim())))
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    carts: Arc<dyn CartRepository>,
    events: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        carts: Arc<dyn CartRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { orders, products, carts, events }
    }

    pub async fn load(&self, id: Uuid) -> Result<Order> {
        self.orders.get(id).await?.ok_or_else(|| StoreError::NotFound("Order not found".into()))
    }

    pub async fn load_owned(&self, id: Uuid, user_id: &str) -> Result<Order> {
        let order = self.load(id).await?;
        if !order.is_owned_by(user_id) {
            return Err(StoreError::Forbidden("Forbidden".into()));
        }
        Ok(order)
    }

    pub(crate) async fn commit(&self, order: &mut Order) -> Result<()> {
        self.orders.save(order).await?;
        publish_all(self.events.as_ref(), order.take_events()).await;
        Ok(())
    }

    #[instrument(skip(self, reason), fields(order_id = %id))]
    pub async fn cancel(&self, user_id: &str, id: Uuid, reason: &str) -> Result<Transition> {
        let mut order = self.load_owned(id, user_id).await?;
        let transition = order.cancel(reason.trim(), Utc::now())?;
        if transition.is_applied() {
            self.commit(&mut order).await?;
            apply_delta(self.products.as_ref(), order.items(), StockSign::Increment).await?;
            info!("Order cancelled");
        }
        Ok(transition)
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn confirm_received(&self, user_id: &str, id: Uuid) -> Result<Transition> {
        let mut order = self.load_owned(id, user_id).await?;
        let transition = order.confirm_received(Utc::now())?;
        if transition.is_applied() {
            self.commit(&mut order).await?;
        }
        Ok(transition)
    }

    /// Refund without media.
    #[instrument(skip(self, claim), fields(order_id = %id))]
    pub async fn request_refund(&self, user_id: &str, id: Uuid, claim: RefundClaim) -> Result<(Order, Transition)> {
        if claim.reason.trim().is_empty() {
            return Err(StoreError::InvalidInput("Reason is required".into()));
        }
        let mut order = self.load_owned(id, user_id).await?;
        let transition = order.request_refund(claim, Utc::now())?;
        if transition.is_applied() {
            self.commit(&mut order).await?;
        }
        Ok((order, transition))
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn resolve_refund(&self, id: Uuid, status: RefundStatus) -> Result<Order> {
        let mut order = self.load(id).await?;
        if order.resolve_refund(status, Utc::now())?.is_applied() {
            self.commit(&mut order).await?;
        }
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Transition> {
        let mut order = self.load(id).await?;
        let transition = order.transition_to(status, Utc::now())?;
        if transition.is_applied() {
            self.commit(&mut order).await?;
        }
        Ok(transition)
    }

    /// Returns the number of orders actually moved.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_update_status(&self, ids: &[String], status: Option<&str>) -> Result<u64> {
        let status = status.map(str::trim).filter(|s| !s.is_empty());
        let (false, Some(status)) = (ids.is_empty(), status) else {
            return Err(StoreError::InvalidInput("orderIds and status are required".into()));
        };
        let status: OrderStatus = status.parse()?;
        let ids = ids.iter().map(|raw| parse_order_id(raw)).collect::<Result<Vec<_>>>()?;
        let modified = self.orders.bulk_transition(&ids, status, Utc::now()).await?;
        info!(modified, status = %status, "Bulk status update");
        Ok(modified)
    }

    /// `Settled` marks the order paid, clears the cart and takes stock once.
    /// `Failed` deletes the order unless it was already paid. Returns whether
    /// the order ends up paid.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn apply_payment(&self, user_id: &str, id: Uuid, outcome: PaymentOutcome) -> Result<bool> {
        let mut order = self.load_owned(id, user_id).await?;
        match outcome {
            PaymentOutcome::Settled => {
                if order.settle_payment(Utc::now())?.is_applied() {
                    self.commit(&mut order).await?;
                    self.carts.clear(order.user_id()).await?;
                    apply_delta(self.products.as_ref(), order.items(), StockSign::Decrement).await?;
                    info!("Payment settled");
                }
                Ok(true)
            }
            PaymentOutcome::Failed if order.is_paid() => {
                info!("Ignoring failure report for a paid order");
                Ok(true)
            }
            PaymentOutcome::Failed => {
                self.remove(id).await?;
                Ok(false)
            }
        }
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.remove(id).await
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        if self.orders.delete(id).await? {
            self.events.publish(&DomainEvent::Order(OrderEvent::Deleted { order_id: id })).await;
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.orders.list().await?)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        Ok(self.orders.list_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, PaymentMethod, Product};
    use crate::domain::value_objects::PriceBreakdown;
    use crate::services::publisher::RecordingPublisher;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    async fn fixture() -> (OrderService, MemoryStorage, RecordingPublisher, Order) {
        let storage = MemoryStorage::new();
        storage.put_product(Product::new("P1", "Figure", 10.0).with_stock(10)).await;
        let publisher = RecordingPublisher::new();
        let service = OrderService::new(
            Arc::new(storage.clone()), Arc::new(storage.clone()), Arc::new(storage.clone()), Arc::new(publisher.clone()),
        );
        let items: Vec<OrderItem> = serde_json::from_value(json!([{ "productId": "P1", "name": "Figure", "price": 10, "quantity": 2 }])).unwrap();
        let price = PriceBreakdown::compute(&items, 100).unwrap();
        let order = Order::place("U1", items, json!({}), PaymentMethod::Stripe, &price, Utc::now()).unwrap();
        OrderRepository::insert(&storage, &order).await.unwrap();
        (service, storage, publisher, order)
    }

    async fn stock(storage: &MemoryStorage) -> i64 {
        ProductRepository::get(storage, "P1").await.unwrap().unwrap().stock()
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_once() {
        let (service, storage, publisher, order) = fixture().await;
        assert_eq!(service.cancel("U1", order.id(), "changed my mind").await.unwrap(), Transition::Applied);
        assert_eq!(service.cancel("U1", order.id(), "again").await.unwrap(), Transition::Unchanged);
        assert_eq!(stock(&storage).await, 12);
        assert_eq!(publisher.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_other_users_are_forbidden() {
        let (service, _, _, order) = fixture().await;
        assert!(matches!(service.cancel("U2", order.id(), "x").await, Err(StoreError::Forbidden(_))));
        assert!(matches!(service.confirm_received("U1", Uuid::new_v4()).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_settled_payment_is_idempotent() {
        let (service, storage, _, order) = fixture().await;
        storage.set_cart("U1", json!({ "P1": 2 })).await;
        assert!(service.apply_payment("U1", order.id(), PaymentOutcome::Settled).await.unwrap());
        assert!(service.apply_payment("U1", order.id(), PaymentOutcome::Settled).await.unwrap());
        assert_eq!(stock(&storage).await, 8);
        assert!(storage.cart("U1").await.is_none());
        let saved = service.load(order.id()).await.unwrap();
        assert!(saved.is_paid());
        assert_eq!(saved.status(), OrderStatus::Paid);

        // a late failure never deletes a paid order
        assert!(service.apply_payment("U1", order.id(), PaymentOutcome::Failed).await.unwrap());
        assert!(service.load(order.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_payment_deletes_unpaid_order() {
        let (service, storage, _, order) = fixture().await;
        assert!(!service.apply_payment("U1", order.id(), PaymentOutcome::Failed).await.unwrap());
        assert!(OrderRepository::get(&storage, order.id()).await.unwrap().is_none());
        assert_eq!(stock(&storage).await, 10);
    }

    #[tokio::test]
    async fn test_bulk_update_validation() {
        let (service, _, _, order) = fixture().await;
        assert!(matches!(service.bulk_update_status(&[], Some("Shipped")).await, Err(StoreError::InvalidInput(_))));
        assert!(matches!(service.bulk_update_status(&[order.id().to_string()], None).await, Err(StoreError::InvalidInput(_))));
        assert!(matches!(service.bulk_update_status(&["nope".into()], Some("Shipped")).await, Err(StoreError::InvalidInput(_))));
        let ids = vec![order.id().to_string(), Uuid::new_v4().to_string()];
        assert_eq!(service.bulk_update_status(&ids, Some("shipped")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refund_flow() {
        let (service, _, _, order) = fixture().await;
        let claim = RefundClaim { reason: "broken".into(), ..Default::default() };
        assert!(matches!(service.request_refund("U1", order.id(), claim.clone()).await, Err(StoreError::InvalidState(_))));
        assert!(matches!(
            service.request_refund("U1", order.id(), RefundClaim::default()).await,
            Err(StoreError::InvalidInput(m)) if m == "Reason is required"
        ));
        service.update_status(order.id(), OrderStatus::Delivered).await.unwrap();
        let (saved, t) = service.request_refund("U1", order.id(), claim.clone()).await.unwrap();
        assert_eq!(t, Transition::Applied);
        assert_eq!(saved.status(), OrderStatus::RefundRequested);
        assert_eq!(service.request_refund("U1", order.id(), claim).await.unwrap().1, Transition::Unchanged);

        let resolved = service.resolve_refund(order.id(), RefundStatus::Approved).await.unwrap();
        assert_eq!(resolved.refund_request().unwrap().status, RefundStatus::Approved);
    }
}
