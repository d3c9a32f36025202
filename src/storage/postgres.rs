//! Postgres storage
//!
//! Orders and reviews are JSONB documents with indexed copies of the fields
//! we filter on. Knowledge records live in a pgvector table whose dimension
//! is fixed when the table is first created.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    check_dimension, CartRepository, KnowledgeStore, OrderRepository, ProductRepository,
    ReviewRepository, StorageError, StorageResult,
};
use crate::domain::aggregates::{
    KnowledgeHit, KnowledgeRecord, KnowledgeSource, Order, OrderStatus, Product, Review,
};

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStorage {
    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert(&self, order: &Order) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, paid, doc, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(order.status().label())
        .bind(order.is_paid())
        .bind(Json(order))
        .bind(order.date())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Order>> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn save(&self, order: &Order) -> StorageResult<()> {
        sqlx::query("UPDATE orders SET status = $2, paid = $3, doc = $4, updated_at = $5 WHERE id = $1")
            .bind(order.id())
            .bind(order.status().label())
            .bind(order.is_paid())
            .bind(Json(order))
            .bind(order.updated_at())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> StorageResult<Vec<Order>> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<Order>> {
        let rows: Vec<(Json<Order>,)> =
            sqlx::query_as("SELECT doc FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len(), to = %to))]
    async fn bulk_transition(&self, ids: &[Uuid], to: OrderStatus, at: DateTime<Utc>) -> StorageResult<u64> {
        let from: Vec<&str> = OrderStatus::predecessors(to).iter().map(|s| s.label()).collect();
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2::text,
                updated_at = $3,
                doc = jsonb_set(
                        jsonb_set(
                            CASE WHEN $2::text = 'Delivered'
                                 THEN jsonb_set(doc, '{deliveredAt}', to_jsonb($3::timestamptz))
                                 ELSE doc END,
                            '{status}', to_jsonb($2::text)),
                        '{updatedAt}', to_jsonb($3::timestamptz))
            WHERE id = ANY($1) AND status = ANY($4)
            ",
        )
        .bind(ids)
        .bind(to.label())
        .bind(at)
        .bind(&from)
        .execute(&self.pool)
        .await?;
        debug!(modified = result.rows_affected(), "Bulk status update");
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow { id: String, name: String, description: String, price: f64, stock: i64, sub_category: String }

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product::new(r.id, r.name, r.price).with_description(r.description).with_stock(r.stock).with_sub_category(r.sub_category)
    }
}

#[async_trait]
impl ProductRepository for PgStorage {
    async fn get(&self, id: &str) -> StorageResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, description, price, stock, sub_category FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn list(&self) -> StorageResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, description, price, stock, sub_category FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn adjust_stock(&self, id: &str, delta: i64) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CartRepository for PgStorage {
    async fn clear(&self, user_id: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO carts (user_id, items, updated_at) VALUES ($1, '{}'::jsonb, NOW())
             ON CONFLICT (user_id) DO UPDATE SET items = '{}'::jsonb, updated_at = NOW()",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for PgStorage {
    async fn insert(&self, review: &Review) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO reviews (id, product_id, order_id, user_id, rating, doc, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(review.id())
        .bind(review.product_id())
        .bind(review.order_id())
        .bind(review.user_id())
        .bind(i16::from(review.rating().value()))
        .bind(Json(review))
        .bind(review.created_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_product(&self, product_id: &str) -> StorageResult<Vec<Review>> {
        let rows: Vec<(Json<Review>,)> =
            sqlx::query_as("SELECT doc FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
                .bind(product_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }
}

/// pgvector-backed knowledge store.
#[derive(Clone)]
pub struct PgKnowledgeStore {
    pool: PgPool,
    dimension: usize,
}

#[derive(sqlx::FromRow)]
struct KnowledgeRow {
    id: Uuid,
    title: String,
    text: String,
    tags: Vec<String>,
    embedding: String,
    source: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct KnowledgeHitRow { id: Uuid, title: String, text: String, tags: Vec<String>, score: Option<f64> }

impl PgKnowledgeStore {
    /// Creates the table with `dimension` if absent. An existing table with
    /// another dimension is refused rather than altered.
    #[instrument(skip(pool))]
    pub async fn open(pool: PgPool, dimension: usize) -> StorageResult<Self> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector").execute(&pool).await?;

        let existing: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute WHERE attrelid = to_regclass('knowledge_records') AND attname = 'embedding'",
        )
        .fetch_optional(&pool)
        .await?;

        match existing {
            Some((found,)) if usize::try_from(found).ok() != Some(dimension) => {
                return Err(StorageError::DimensionMismatch { expected: dimension, actual: found.max(0) as usize });
            }
            Some(_) => debug!("Knowledge table present"),
            None => {
                let ddl = format!(
                    "CREATE TABLE IF NOT EXISTS knowledge_records (
                        id UUID PRIMARY KEY,
                        title TEXT NOT NULL,
                        text TEXT NOT NULL,
                        tags TEXT[] NOT NULL DEFAULT '{{}}',
                        embedding vector({dimension}) NOT NULL,
                        source TEXT NOT NULL DEFAULT 'manual',
                        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    )"
                );
                sqlx::query(&ddl).execute(&pool).await?;
                info!(dimension, "Created knowledge table");
            }
        }
        Ok(Self { pool, dimension })
    }
}

#[async_trait]
impl KnowledgeStore for PgKnowledgeStore {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn insert(&self, records: Vec<KnowledgeRecord>) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for r in &records {
            check_dimension(self.dimension, &r.embedding)?;
            sqlx::query(
                "INSERT INTO knowledge_records (id, title, text, tags, embedding, source, created_at)
                 VALUES ($1, $2, $3, $4, $5::vector, $6, $7)",
            )
            .bind(r.id)
            .bind(&r.title)
            .bind(&r.text)
            .bind(&r.tags)
            .bind(format_embedding(&r.embedding))
            .bind(r.source.as_str())
            .bind(r.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_all(&self) -> StorageResult<Vec<KnowledgeRecord>> {
        let rows = sqlx::query_as::<_, KnowledgeRow>(
            "SELECT id, title, text, tags, embedding::text AS embedding, source, created_at
             FROM knowledge_records ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(KnowledgeRecord {
                    id: r.id,
                    title: r.title,
                    text: r.text,
                    tags: r.tags,
                    embedding: parse_embedding(&r.embedding)?,
                    created_at: r.created_at,
                    source: r.source.parse().map_err(StorageError::Corrupt)?,
                })
            })
            .collect()
    }

    async fn delete_by_id(&self, id: Uuid) -> StorageResult<()> {
        sqlx::query("DELETE FROM knowledge_records WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_by_source(&self, source: KnowledgeSource) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM knowledge_records WHERE source = $1")
            .bind(source.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, vector))]
    async fn search(&self, vector: &[f32], k: usize) -> StorageResult<Vec<KnowledgeHit>> {
        check_dimension(self.dimension, vector)?;
        // Runtime query: sqlx has no built-in pgvector type
        let rows = sqlx::query_as::<_, KnowledgeHitRow>(
            r"
            SELECT id, title, text, tags, 1 - (embedding <=> $1::vector) AS score
            FROM knowledge_records
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            ",
        )
        .bind(format_embedding(vector))
        .bind(i64::try_from(k).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| KnowledgeHit { id: r.id, title: r.title, text: r.text, tags: r.tags, score: r.score.unwrap_or(0.0) as f32 })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Format an embedding vector for pgvector.
fn format_embedding(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(ToString::to_string).collect();
    format!("[{}]", values.join(","))
}

fn parse_embedding(text: &str) -> StorageResult<Vec<f32>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| StorageError::Corrupt(format!("embedding value '{v}': {e}"))))
        .collect()
}
