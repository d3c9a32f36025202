//! Knowledge base maintenance for the shopping assistant

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::ai::{AiError, Embedder};
use crate::domain::aggregates::{KnowledgeRecord, KnowledgeSource};
use crate::error::{Result, StoreError};
use crate::storage::{KnowledgeStore, ProductRepository};

pub const PRODUCT_CHUNK_CHARS: usize = 800;
pub const PRODUCT_TAG: &str = "product";

/// Splits after sentence punctuation and packs sentences, joined by one
/// space, into chunks of at most `max_chars`. A longer sentence stays whole.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            sentences.push(&text[start..i]);
            let mut end = i + c.len_utf8();
            while let Some(&(j, w)) = iter.peek() {
                if !w.is_whitespace() {
                    break;
                }
                end = j + w.len_utf8();
                iter.next();
            }
            start = end;
            prev = None;
            continue;
        }
        prev = Some(c);
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    for sentence in sentences.into_iter().filter(|s| !s.is_empty()) {
        if buf.chars().count() + 1 + sentence.chars().count() > max_chars {
            if !buf.trim().is_empty() {
                chunks.push(buf.trim().to_string());
            }
            buf = sentence.to_string();
        } else if buf.is_empty() {
            buf = sentence.to_string();
        } else {
            buf.push(' ');
            buf.push_str(sentence);
        }
    }
    if !buf.trim().is_empty() {
        chunks.push(buf.trim().to_string());
    }
    chunks
}

#[derive(Clone)]
pub struct KnowledgeService {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    products: Arc<dyn ProductRepository>,
}

impl KnowledgeService {
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>, products: Arc<dyn ProductRepository>) -> Self {
        Self { store, embedder, products }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        let expected = self.store.dimension();
        if vector.len() != expected {
            return Err(AiError::DimensionMismatch { expected, actual: vector.len() }.into());
        }
        Ok(vector)
    }

    /// Replaces the record with the same id, if any. Returns the record id.
    #[instrument(skip(self, text, tags), fields(title = %title.trim()))]
    pub async fn upsert(&self, id: Option<Uuid>, title: &str, text: &str, tags: Vec<String>) -> Result<Uuid> {
        let (title, text) = (title.trim(), text.trim());
        if title.is_empty() || text.is_empty() {
            return Err(StoreError::InvalidInput("title & text required".into()));
        }
        let embedding = self.embed(&format!("{title}\n{text}")).await?;
        if let Some(id) = id {
            self.store.delete_by_id(id).await?;
        }
        let record = KnowledgeRecord {
            id: id.unwrap_or_else(Uuid::new_v4),
            title: title.to_string(),
            text: text.to_string(),
            tags,
            embedding,
            created_at: Utc::now(),
            source: KnowledgeSource::Manual,
        };
        let id = record.id;
        self.store.insert(vec![record]).await?;
        info!(%id, "Knowledge record upserted");
        Ok(id)
    }

    pub async fn list(&self) -> Result<Vec<KnowledgeRecord>> {
        let mut records = self.store.list_all().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        Ok(self.store.delete_by_id(id).await?)
    }

    /// Rebuilds every product-sourced record. Embeds first so a model
    /// failure leaves the previous index in place. Returns the chunk count.
    #[instrument(skip(self))]
    pub async fn reindex_products(&self) -> Result<usize> {
        let products = self.products.list().await?;
        let mut records = Vec::new();
        for product in &products {
            for chunk in chunk_text(&product.knowledge_text(), PRODUCT_CHUNK_CHARS) {
                let embedding = self.embed(&chunk).await?;
                records.push(KnowledgeRecord {
                    id: Uuid::new_v4(),
                    title: format!("[PRODUCT] {}", product.name()),
                    text: chunk,
                    tags: vec![PRODUCT_TAG.to_string()],
                    embedding,
                    created_at: Utc::now(),
                    source: KnowledgeSource::Product,
                });
            }
        }
        let removed = self.store.delete_by_source(KnowledgeSource::Product).await?;
        let inserted = records.len();
        self.store.insert(records).await?;
        info!(products = products.len(), removed, inserted, "Product knowledge reindexed");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::storage::{MemoryKnowledgeStore, MemoryStorage};
    use async_trait::async_trait;

    struct LengthEmbedder(usize);

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, AiError> {
            Ok(vec![text.len() as f32; self.0])
        }
    }

    #[test]
    fn test_chunk_text_packs_sentences() {
        assert_eq!(chunk_text("One. Two!  Three? Four", 100), vec!["One. Two! Three? Four"]);
        assert_eq!(chunk_text("Aaaa. Bbbb. Cccc.", 10), vec!["Aaaa.", "Bbbb.", "Cccc."]);
        assert_eq!(chunk_text("Aa. Bb. Cc.", 7), vec!["Aa. Bb.", "Cc."]);
        assert_eq!(chunk_text("A very long sentence without a break", 5), vec!["A very long sentence without a break"]);
        assert_eq!(chunk_text("Line one\nPrice: 3.5 USD", 800), vec!["Line one\nPrice: 3.5 USD"]);
        assert!(chunk_text("", 10).is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_checks_dimension() {
        let store = Arc::new(MemoryKnowledgeStore::new(4));
        let service = KnowledgeService::new(store.clone(), Arc::new(LengthEmbedder(4)), Arc::new(MemoryStorage::new()));
        let id = service.upsert(None, " Returns ", "7 days.", vec!["refund".into()]).await.unwrap();
        service.upsert(Some(id), "Returns", "14 days.", vec![]).await.unwrap();
        let all = service.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "14 days.");
        assert!(matches!(service.upsert(None, "", "x", vec![]).await, Err(StoreError::InvalidInput(_))));

        let wrong = KnowledgeService::new(store, Arc::new(LengthEmbedder(3)), Arc::new(MemoryStorage::new()));
        assert!(matches!(wrong.upsert(None, "t", "x", vec![]).await, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reindex_products_replaces_product_records() {
        let products = MemoryStorage::new();
        products.put_product(Product::new("P1", "Figure", 12.5).with_stock(3)).await;
        let store = Arc::new(MemoryKnowledgeStore::new(2));
        let service = KnowledgeService::new(store.clone(), Arc::new(LengthEmbedder(2)), Arc::new(products));
        service.upsert(None, "Shipping policy", "2-7 days.", vec![]).await.unwrap();

        assert_eq!(service.reindex_products().await.unwrap(), 1);
        assert_eq!(service.reindex_products().await.unwrap(), 1);
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let product = all.iter().find(|r| r.source == KnowledgeSource::Product).unwrap();
        assert_eq!(product.title, "[PRODUCT] Figure");
        assert!(product.text.contains("Price: 12.5 USD"));
        assert_eq!(product.tags, vec!["product"]);
    }
}
