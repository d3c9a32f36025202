//! Refund and review submissions with media evidence

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::lifecycle::{parse_order_id, OrderService};
use super::publisher::{publish_all, EventPublisher};
use crate::domain::aggregates::{NewReview, Order, RefundClaim, Review, Transition};
use crate::domain::value_objects::Rating;
use crate::error::{Result, StoreError};
use crate::media::{store_bundle, BlobStore, MediaBundle, MediaLimits};
use crate::storage::{ProductRepository, ReviewRepository};

pub const REFUND_NAMESPACE: &str = "refunds";
pub const REVIEW_NAMESPACE: &str = "reviews";

#[derive(Debug, Clone, Default)]
pub struct RefundSubmission {
    pub reason: String,
    pub other_reason: String,
    pub media: MediaBundle,
}

/// Raw review form. `rating` may arrive as a number or numeric string.
#[derive(Debug, Clone, Default)]
pub struct ReviewSubmission {
    pub product_id: String,
    pub order_id: Option<String>,
    pub rating: String,
    pub comment: String,
    pub media: MediaBundle,
}

#[derive(Clone)]
pub struct IntakeService {
    lifecycle: OrderService,
    products: Arc<dyn ProductRepository>,
    reviews: Arc<dyn ReviewRepository>,
    blobs: Arc<dyn BlobStore>,
    events: Arc<dyn EventPublisher>,
    limits: MediaLimits,
}

impl IntakeService {
    pub fn new(
        lifecycle: OrderService,
        products: Arc<dyn ProductRepository>,
        reviews: Arc<dyn ReviewRepository>,
        blobs: Arc<dyn BlobStore>,
        events: Arc<dyn EventPublisher>,
        limits: MediaLimits,
    ) -> Self {
        Self { lifecycle, products, reviews, blobs, events, limits }
    }

    /// Every check runs before any file is written. A repeated request
    /// returns the order untouched and stores nothing.
    #[instrument(skip(self, submission), fields(order_id = %order_id, files = submission.media.images.len() + submission.media.video.len()))]
    pub async fn request_refund(&self, user_id: &str, order_id: Uuid, submission: RefundSubmission) -> Result<(Order, Transition)> {
        if submission.reason.trim().is_empty() {
            return Err(StoreError::InvalidInput("Reason is required".into()));
        }
        submission.media.validate(&self.limits)?;
        let mut order = self.lifecycle.load_owned(order_id, user_id).await?;
        if !order.check_refundable()?.is_applied() {
            return Ok((order, Transition::Unchanged));
        }

        let stored = store_bundle(self.blobs.as_ref(), REFUND_NAMESPACE, &submission.media).await?;
        let claim = RefundClaim {
            reason: submission.reason.trim().to_string(),
            other_reason: submission.other_reason.trim().to_string(),
            images: stored.images,
            video: stored.video,
        };
        let transition = order.request_refund(claim, Utc::now())?;
        self.lifecycle.commit(&mut order).await?;
        info!("Refund requested");
        Ok((order, transition))
    }

    #[instrument(skip(self, submission), fields(product_id = %submission.product_id))]
    pub async fn create_review(&self, user_id: Option<&str>, submission: ReviewSubmission) -> Result<Review> {
        let user_id = user_id.filter(|u| !u.trim().is_empty()).ok_or_else(|| StoreError::Unauthorized("Unauthorized".into()))?;
        let product_id = submission.product_id.trim();
        if product_id.is_empty() {
            return Err(StoreError::InvalidInput("Missing productId".into()));
        }
        let rating = Rating::parse(&submission.rating)?;
        let order_id = submission
            .order_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_order_id)
            .transpose()?;
        submission.media.validate(&self.limits)?;
        if self.products.get(product_id).await?.is_none() {
            return Err(StoreError::NotFound("Product not found".into()));
        }

        let stored = store_bundle(self.blobs.as_ref(), REVIEW_NAMESPACE, &submission.media).await?;
        let mut review = Review::create(
            NewReview {
                product_id: product_id.to_string(),
                order_id,
                user_id: user_id.to_string(),
                rating,
                comment: submission.comment.trim().to_string(),
                images: stored.images,
                video: stored.video,
            },
            Utc::now(),
        );
        self.reviews.insert(&review).await?;
        publish_all(self.events.as_ref(), review.take_events()).await;
        Ok(review)
    }

    pub async fn reviews_for_product(&self, product_id: &str) -> Result<Vec<Review>> {
        Ok(self.reviews.list_for_product(product_id.trim()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, OrderStatus, PaymentMethod, Product};
    use crate::domain::value_objects::PriceBreakdown;
    use crate::media::{MediaKind, MediaUpload, MemoryBlobStore};
    use crate::services::publisher::LogPublisher;
    use crate::storage::{MemoryStorage, OrderRepository};
    use serde_json::json;

    async fn fixture() -> (IntakeService, MemoryStorage, MemoryBlobStore, Order) {
        let storage = MemoryStorage::new();
        storage.put_product(Product::new("P1", "Figure", 10.0)).await;
        let blobs = MemoryBlobStore::new();
        let s = Arc::new(storage.clone());
        let lifecycle = OrderService::new(s.clone(), s.clone(), s.clone(), Arc::new(LogPublisher));
        let intake = IntakeService::new(lifecycle, s.clone(), s, Arc::new(blobs.clone()), Arc::new(LogPublisher), MediaLimits::default());
        let items: Vec<OrderItem> = serde_json::from_value(json!([{ "productId": "P1", "price": 10, "quantity": 1 }])).unwrap();
        let price = PriceBreakdown::compute(&items, 0).unwrap();
        let mut order = Order::place("U1", items, json!({}), PaymentMethod::Cod, &price, Utc::now()).unwrap();
        order.transition_to(OrderStatus::Delivered, Utc::now()).unwrap();
        OrderRepository::insert(&storage, &order).await.unwrap();
        (intake, storage, blobs, order)
    }

    fn image() -> MediaUpload {
        MediaUpload { kind: MediaKind::Image, content_type: "image/png".into(), file_name: Some("a.png".into()), bytes: vec![1, 2, 3] }
    }

    fn submission(n_images: usize) -> RefundSubmission {
        let mut media = MediaBundle::default();
        (0..n_images).for_each(|_| media.push(image()));
        RefundSubmission { reason: "Damaged".into(), other_reason: String::new(), media }
    }

    #[tokio::test]
    async fn test_refund_stores_media_once() {
        let (intake, _, blobs, order) = fixture().await;
        let (saved, t) = intake.request_refund("U1", order.id(), submission(2)).await.unwrap();
        assert_eq!(t, Transition::Applied);
        let refund = saved.refund_request().unwrap();
        assert_eq!(refund.images.len(), 2);
        assert!(refund.images[0].starts_with("/uploads/refunds/"));

        let (_, t) = intake.request_refund("U1", order.id(), submission(1)).await.unwrap();
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(blobs.len().await, 2);
    }

    #[tokio::test]
    async fn test_refund_rejections_store_nothing() {
        let (intake, _, blobs, order) = fixture().await;
        assert!(matches!(intake.request_refund("U2", order.id(), submission(1)).await, Err(StoreError::Forbidden(_))));
        assert!(matches!(intake.request_refund("U1", order.id(), submission(5)).await, Err(StoreError::UnsupportedMedia(_))));
        let mut no_reason = submission(1);
        no_reason.reason = "  ".into();
        assert!(matches!(intake.request_refund("U1", order.id(), no_reason).await, Err(StoreError::InvalidInput(_))));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_review_validation() {
        let (intake, _, _, _) = fixture().await;
        let good = ReviewSubmission { product_id: "P1".into(), rating: "5".into(), ..Default::default() };

        assert!(matches!(intake.create_review(None, good.clone()).await, Err(StoreError::Unauthorized(_))));
        let bad = ReviewSubmission { rating: "6".into(), ..good.clone() };
        assert!(matches!(intake.create_review(Some("U1"), bad).await, Err(StoreError::InvalidRating)));
        let missing = ReviewSubmission { product_id: "X".into(), ..good.clone() };
        assert!(matches!(intake.create_review(Some("U1"), missing).await, Err(StoreError::NotFound(_))));

        let review = intake.create_review(Some("U1"), good).await.unwrap();
        assert_eq!(review.rating().value(), 5);
        assert_eq!(review.comment(), "");
        assert_eq!(intake.reviews_for_product("P1").await.unwrap().len(), 1);
    }
}
