//! Aggregates module
pub mod product;
pub mod order;
pub mod review;
pub mod knowledge;

pub use product::Product;
pub use order::{Order, OrderError, OrderItem, OrderStatus, PaymentMethod, RefundClaim, RefundRequest, RefundStatus, Transition};
pub use review::{NewReview, Review};
pub use knowledge::{KnowledgeHit, KnowledgeRecord, KnowledgeSource};
