//! Persistence seams
//!
//! Services hold `Arc<dyn ...>` handles to these traits. `postgres` is the
//! production backing; `memory` backs tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    KnowledgeHit, KnowledgeRecord, KnowledgeSource, Order, OrderStatus, Product, Review,
};

pub use memory::{MemoryKnowledgeStore, MemoryStorage};
pub use postgres::{PgKnowledgeStore, PgStorage};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> StorageResult<()>;

    async fn get(&self, id: Uuid) -> StorageResult<Option<Order>>;

    /// Overwrites the stored order with the same id.
    async fn save(&self, order: &Order) -> StorageResult<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> StorageResult<bool>;

    /// Newest first.
    async fn list(&self) -> StorageResult<Vec<Order>>;

    /// Newest first.
    async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<Order>>;

    /// Moves every listed order whose current status may legally reach `to`.
    /// Returns the number of orders changed.
    async fn bulk_transition(&self, ids: &[Uuid], to: OrderStatus, at: DateTime<Utc>) -> StorageResult<u64>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get(&self, id: &str) -> StorageResult<Option<Product>>;

    async fn list(&self) -> StorageResult<Vec<Product>>;

    /// Atomic `stock += delta`. Returns false when the product does not exist.
    async fn adjust_stock(&self, id: &str, delta: i64) -> StorageResult<bool>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn clear(&self, user_id: &str) -> StorageResult<()>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn insert(&self, review: &Review) -> StorageResult<()>;

    /// Newest first.
    async fn list_for_product(&self, product_id: &str) -> StorageResult<Vec<Review>>;
}

/// Vector-indexed knowledge records. The dimension is fixed for the life of
/// the store.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn insert(&self, records: Vec<KnowledgeRecord>) -> StorageResult<()>;

    async fn list_all(&self) -> StorageResult<Vec<KnowledgeRecord>>;

    /// No error when absent.
    async fn delete_by_id(&self, id: Uuid) -> StorageResult<()>;

    async fn delete_by_source(&self, source: KnowledgeSource) -> StorageResult<u64>;

    /// Top `k` by cosine similarity, best first.
    async fn search(&self, vector: &[f32], k: usize) -> StorageResult<Vec<KnowledgeHit>>;

    fn dimension(&self) -> usize;
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> StorageResult<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(StorageError::DimensionMismatch { expected, actual: vector.len() })
    }
}
