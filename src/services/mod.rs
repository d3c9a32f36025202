//! Application services
//!
//! Each service holds trait-object handles to storage, gateways and the
//! event publisher, so the router can be built over Postgres or memory.

pub mod checkout;
pub mod intake;
pub mod knowledge;
pub mod lifecycle;
pub mod publisher;
pub mod stock;

pub use checkout::{CheckoutResult, CheckoutService};
pub use intake::{IntakeService, RefundSubmission, ReviewSubmission};
pub use knowledge::{chunk_text, KnowledgeService};
pub use lifecycle::OrderService;
pub use publisher::{EventPublisher, LogPublisher, NatsPublisher, RecordingPublisher};
pub use stock::{apply_delta, StockSign};
