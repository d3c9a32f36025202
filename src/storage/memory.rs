//! In-memory storage
//!
//! Thread-safe maps behind `tokio::sync::RwLock`. Used by tests and local
//! runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    check_dimension, CartRepository, KnowledgeStore, OrderRepository, ProductRepository,
    ReviewRepository, StorageResult,
};
use crate::domain::aggregates::{
    KnowledgeHit, KnowledgeRecord, KnowledgeSource, Order, OrderStatus, Product, Review,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    products: Arc<RwLock<HashMap<String, Product>>>,
    carts: Arc<RwLock<HashMap<String, Value>>>,
    reviews: Arc<RwLock<Vec<Review>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_product(&self, product: Product) {
        self.products.write().await.insert(product.id().to_string(), product);
    }

    pub async fn set_cart(&self, user_id: &str, cart: Value) {
        self.carts.write().await.insert(user_id.to_string(), cart);
    }

    /// `None` once cleared or never set.
    pub async fn cart(&self, user_id: &str) -> Option<Value> {
        self.carts.read().await.get(user_id).cloned().filter(|c| c.as_object().is_some_and(|o| !o.is_empty()))
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.date().cmp(&a.date()));
    orders
}

#[async_trait]
impl OrderRepository for MemoryStorage {
    async fn insert(&self, order: &Order) -> StorageResult<()> {
        self.orders.write().await.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save(&self, order: &Order) -> StorageResult<()> {
        self.orders.write().await.insert(order.id(), order.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.orders.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> StorageResult<Vec<Order>> {
        Ok(newest_first(self.orders.read().await.values().cloned().collect()))
    }

    async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(newest_first(orders.values().filter(|o| o.is_owned_by(user_id)).cloned().collect()))
    }

    async fn bulk_transition(&self, ids: &[Uuid], to: OrderStatus, at: DateTime<Utc>) -> StorageResult<u64> {
        let mut orders = self.orders.write().await;
        let mut modified = 0;
        for id in ids {
            if let Some(order) = orders.get_mut(id) {
                if matches!(order.transition_to(to, at), Ok(t) if t.is_applied()) {
                    order.take_events();
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }
}

#[async_trait]
impl ProductRepository for MemoryStorage {
    async fn get(&self, id: &str) -> StorageResult<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<Product>> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(products)
    }

    async fn adjust_stock(&self, id: &str, delta: i64) -> StorageResult<bool> {
        match self.products.write().await.get_mut(id) {
            Some(p) => { p.adjust_stock(delta); Ok(true) }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CartRepository for MemoryStorage {
    async fn clear(&self, user_id: &str) -> StorageResult<()> {
        self.carts.write().await.insert(user_id.to_string(), Value::Object(Default::default()));
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for MemoryStorage {
    async fn insert(&self, review: &Review) -> StorageResult<()> {
        self.reviews.write().await.push(review.clone());
        Ok(())
    }

    async fn list_for_product(&self, product_id: &str) -> StorageResult<Vec<Review>> {
        let mut reviews: Vec<Review> = self.reviews.read().await.iter().filter(|r| r.product_id() == product_id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(reviews)
    }
}

/// Exhaustive cosine search over an in-memory list.
#[derive(Debug, Clone)]
pub struct MemoryKnowledgeStore {
    dimension: usize,
    records: Arc<RwLock<Vec<KnowledgeRecord>>>,
}

impl MemoryKnowledgeStore {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, records: Arc::new(RwLock::new(Vec::new())) }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    async fn insert(&self, records: Vec<KnowledgeRecord>) -> StorageResult<()> {
        for r in &records {
            check_dimension(self.dimension, &r.embedding)?;
        }
        self.records.write().await.extend(records);
        Ok(())
    }

    async fn list_all(&self) -> StorageResult<Vec<KnowledgeRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn delete_by_id(&self, id: Uuid) -> StorageResult<()> {
        self.records.write().await.retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_by_source(&self, source: KnowledgeSource) -> StorageResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.source != source);
        Ok((before - records.len()) as u64)
    }

    async fn search(&self, vector: &[f32], k: usize) -> StorageResult<Vec<KnowledgeHit>> {
        check_dimension(self.dimension, vector)?;
        let records = self.records.read().await;
        let mut hits: Vec<KnowledgeHit> = records.iter().map(|r| KnowledgeHit {
            id: r.id, title: r.title.clone(), text: r.text.clone(), tags: r.tags.clone(),
            score: cosine_similarity(vector, &r.embedding),
        }).collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
