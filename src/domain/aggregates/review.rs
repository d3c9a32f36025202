//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Rating;
use crate::domain::events::{DomainEvent, ReviewEvent};

/// Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    id: Uuid,
    product_id: String,
    order_id: Option<Uuid>,
    user_id: String,
    rating: Rating,
    comment: String,
    images: Vec<String>,
    video: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug)]
pub struct NewReview {
    pub product_id: String,
    pub order_id: Option<Uuid>,
    pub user_id: String,
    pub rating: Rating,
    pub comment: String,
    pub images: Vec<String>,
    pub video: Option<String>,
}

impl Review {
    pub fn create(new: NewReview, now: DateTime<Utc>) -> Self {
        let mut review = Self {
            id: Uuid::now_v7(), product_id: new.product_id, order_id: new.order_id, user_id: new.user_id,
            rating: new.rating, comment: new.comment, images: new.images, video: new.video,
            created_at: now, events: vec![],
        };
        review.events.push(DomainEvent::Review(ReviewEvent::Created {
            review_id: review.id, product_id: review.product_id.clone(), rating: review.rating.value(),
        }));
        review
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn product_id(&self) -> &str { &self.product_id }
    pub fn order_id(&self) -> Option<Uuid> { self.order_id }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn rating(&self) -> Rating { self.rating }
    pub fn comment(&self) -> &str { &self.comment }
    pub fn images(&self) -> &[String] { &self.images }
    pub fn video(&self) -> Option<&str> { self.video.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
}
