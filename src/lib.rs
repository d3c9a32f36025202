//! OpenSASE Storefront
//!
//! Self-hosted storefront backend: checkout, order lifecycle, refunds,
//! reviews and a shopping assistant.
//!
//! ## Features
//! - Cash on delivery, Stripe and PayPal checkout
//! - Order lifecycle with an explicit transition table
//! - Refund and review intake with media evidence
//! - Knowledge base over pgvector
//! - Retrieval-augmented chat assistant

pub mod ai;
pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod media;
pub mod payments;
pub mod services;
pub mod storage;

pub use api::{router, AppState, Backends, Settings};
pub use config::AppConfig;
pub use error::{Result, StoreError};
