//! Shopping assistant
//!
//! Model backends sit behind two small traits so the chat pipeline and the
//! knowledge service never see HTTP.

pub mod adapter;
pub mod intent;
pub mod ollama;
pub mod pipeline;
pub mod sanitize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use adapter::AdapterClient;
pub use ollama::OllamaClient;
pub use pipeline::{AssistantSettings, ChatPipeline, ChatReply, ContextUsed, ReplyMode};

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Error detail reported by the model service, passed through verbatim.
    #[error("{0}")]
    Upstream(String),

    #[error("Invalid AI service response: {0}")]
    InvalidResponse(String),

    #[error("Embedding has {actual} dimensions, knowledge store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A knowledge snippet handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub context: Vec<ContextItem>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(&self, prompt: &ChatPrompt) -> Result<String, AiError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;
}
