//! Shopping assistant chat route

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::AppState;
use crate::error::{ApiJson, Result};

pub fn routes() -> Router<AppState> {
    Router::new().route("/ai/chat", post(chat))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(custom = "not_blank")]
    message: String,
    /// Product the shopper is looking at, as the storefront renders it.
    #[serde(default)]
    product: Option<Value>,
}

fn not_blank(value: &str) -> std::result::Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("message is required".into());
        return Err(err);
    }
    Ok(())
}

async fn chat(State(state): State<AppState>, ApiJson(body): ApiJson<ChatRequest>) -> Result<Json<Value>> {
    body.validate()?;
    let reply = state.assistant.answer(body.message.trim(), body.product.as_ref()).await?;
    Ok(Json(json!({
        "success": true,
        "answer": reply.answer,
        "contextUsed": reply.context_used,
        "mode": reply.mode,
    })))
}
