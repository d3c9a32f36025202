//! Knowledge base admin routes

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::auth::AdminAccess;
use crate::error::{ApiJson, Result, StoreError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ai/kb", get(list).post(upsert))
        .route("/ai/kb/:id", delete(remove))
        .route("/ai/kb/reindex-products", post(reindex_products))
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
    /// Anything but an array of strings is ignored.
    #[serde(default)]
    tags: Value,
}

fn parse_id(raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|_| StoreError::InvalidInput(format!("Invalid id '{}'", raw.trim())))
}

async fn list(State(state): State<AppState>, _: AdminAccess) -> Result<Json<Value>> {
    let items = state.knowledge.list().await?;
    Ok(Json(json!({ "success": true, "items": items })))
}

async fn upsert(State(state): State<AppState>, _: AdminAccess, ApiJson(body): ApiJson<UpsertRequest>) -> Result<Json<Value>> {
    let id = body.id.as_deref().filter(|s| !s.trim().is_empty()).map(parse_id).transpose()?;
    let tags = body
        .tags
        .as_array()
        .map(|tags| tags.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let id = state.knowledge.upsert(id, &body.title, &body.text, tags).await?;
    Ok(Json(json!({ "success": true, "message": "KB upserted", "id": id })))
}

async fn remove(State(state): State<AppState>, _: AdminAccess, Path(id): Path<String>) -> Result<Json<Value>> {
    state.knowledge.delete(parse_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "message": "KB deleted" })))
}

async fn reindex_products(State(state): State<AppState>, _: AdminAccess) -> Result<Json<Value>> {
    let inserted = state.knowledge.reindex_products().await?;
    Ok(Json(json!({ "success": true, "inserted": inserted })))
}
