//! Review routes

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::{read_evidence, AppState};
use crate::auth::MaybeUser;
use crate::error::Result;
use crate::services::ReviewSubmission;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/review/create", post(create))
        .route("/review/product/:productId", get(list_for_product))
}

async fn create(State(state): State<AppState>, MaybeUser(user): MaybeUser, multipart: Multipart) -> Result<Json<Value>> {
    let form = read_evidence(multipart, &state.limits).await?;
    let submission = ReviewSubmission {
        product_id: form.text("productId"),
        order_id: form.optional("orderId"),
        rating: form.text("rating"),
        comment: form.text("comment"),
        media: form.media,
    };
    let review = state.intake.create_review(user.as_deref(), submission).await?;
    Ok(Json(json!({ "success": true, "review": review })))
}

async fn list_for_product(State(state): State<AppState>, Path(product_id): Path<String>) -> Result<Json<Value>> {
    let reviews = state.intake.reviews_for_product(&product_id).await?;
    Ok(Json(json!({ "success": true, "reviews": reviews })))
}
