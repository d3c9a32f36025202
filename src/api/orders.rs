//! Order routes

use axum::extract::{Multipart, Path, State};
use axum::http::{header::ORIGIN, HeaderMap};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::{read_evidence, AppState};
use crate::auth::{AdminAccess, AuthUser};
use crate::domain::aggregates::{Order, OrderItem, OrderStatus, PaymentMethod, RefundClaim, RefundStatus, Transition};
use crate::error::{ApiJson, Result};
use crate::services::lifecycle::parse_order_id;
use crate::services::{CheckoutResult, RefundSubmission};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/order/place", post(place_cod))
        .route("/order/stripe", post(place_stripe))
        .route("/order/paypal", post(place_paypal))
        .route("/order/verifyStripe", post(verify_stripe))
        .route("/order/verifyPayPal", post(verify_paypal))
        .route("/order/userorders", post(user_orders))
        .route("/order/cancel", post(cancel))
        .route("/order/confirm", post(confirm))
        .route("/order/refund", post(refund))
        .route("/order/request-refund/:orderId", post(request_refund_with_media))
        .route("/order/list", post(list_all))
        .route("/order/status", post(update_status))
        .route("/order/status-bulk", post(update_status_bulk))
        .route("/order/refund-status", post(update_refund_status))
        .route("/order/delete", post(delete_order))
}

/// Order JSON plus the summary fields older clients read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView<'a> {
    #[serde(flatten)]
    order: &'a Order,
    refund_requested: bool,
    refund_status: Option<RefundStatus>,
}

impl<'a> From<&'a Order> for OrderView<'a> {
    fn from(order: &'a Order) -> Self {
        let refund = order.refund_request();
        Self { order, refund_requested: refund.is_some(), refund_status: refund.map(|r| r.status) }
    }
}

fn views(orders: &[Order]) -> Vec<OrderView<'_>> {
    orders.iter().map(OrderView::from).collect()
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Order has no items"))]
    items: Vec<OrderItem>,
    #[serde(default)]
    address: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIdRequest {
    order_id: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    other_reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStripeRequest {
    order_id: String,
    #[serde(default)]
    success: Value,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPayPalRequest {
    order_id: String,
    #[serde(default)]
    success: Value,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    order_id: String,
    status: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "orderIds and status are required"))]
    order_ids: Vec<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundStatusRequest {
    order_id: String,
    refund_status: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    id: String,
}

fn origin<'a>(headers: &'a HeaderMap, state: &'a AppState) -> &'a str {
    headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(&state.frontend_url)
}

async fn place(state: &AppState, user: &AuthUser, headers: &HeaderMap, body: PlaceOrderRequest, method: PaymentMethod) -> Result<Json<Value>> {
    body.validate()?;
    let result = state.checkout.place(user.id(), body.items, body.address, method, origin(headers, state)).await?;
    let response = match (result, method) {
        (CheckoutResult::Placed { order_id }, _) => json!({ "success": true, "message": "Order Placed", "orderId": order_id }),
        (CheckoutResult::Redirect { order_id, url }, PaymentMethod::PayPal) => json!({ "success": true, "approvalUrl": url, "orderId": order_id }),
        (CheckoutResult::Redirect { order_id, url }, _) => json!({ "success": true, "session_url": url, "orderId": order_id }),
    };
    Ok(Json(response))
}

async fn place_cod(State(state): State<AppState>, user: AuthUser, headers: HeaderMap, ApiJson(body): ApiJson<PlaceOrderRequest>) -> Result<Json<Value>> {
    place(&state, &user, &headers, body, PaymentMethod::Cod).await
}

async fn place_stripe(State(state): State<AppState>, user: AuthUser, headers: HeaderMap, ApiJson(body): ApiJson<PlaceOrderRequest>) -> Result<Json<Value>> {
    place(&state, &user, &headers, body, PaymentMethod::Stripe).await
}

async fn place_paypal(State(state): State<AppState>, user: AuthUser, headers: HeaderMap, ApiJson(body): ApiJson<PlaceOrderRequest>) -> Result<Json<Value>> {
    place(&state, &user, &headers, body, PaymentMethod::PayPal).await
}

async fn verify_stripe(State(state): State<AppState>, user: AuthUser, ApiJson(body): ApiJson<VerifyStripeRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    let paid = state.checkout.verify_stripe(user.id(), order_id, is_true(&body.success), body.session_id.as_deref()).await?;
    Ok(Json(json!({ "success": paid })))
}

async fn verify_paypal(State(state): State<AppState>, user: AuthUser, ApiJson(body): ApiJson<VerifyPayPalRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    // The return page omits the flag on approval.
    let approved = body.success.is_null() || is_true(&body.success);
    let paid = state.checkout.verify_paypal(user.id(), order_id, approved, &body.token).await?;
    Ok(Json(json!({ "success": paid })))
}

fn is_true(flag: &Value) -> bool {
    match flag {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

async fn user_orders(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>> {
    let orders = state.orders.list_for_user(user.id()).await?;
    Ok(Json(json!({ "success": true, "orders": views(&orders) })))
}

async fn cancel(State(state): State<AppState>, user: AuthUser, ApiJson(body): ApiJson<OrderIdRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    let message = match state.orders.cancel(user.id(), order_id, &body.reason).await? {
        Transition::Applied => "Order cancelled",
        Transition::Unchanged => "Order already cancelled",
    };
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn confirm(State(state): State<AppState>, user: AuthUser, ApiJson(body): ApiJson<OrderIdRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    let message = match state.orders.confirm_received(user.id(), order_id).await? {
        Transition::Applied => "Order confirmed",
        Transition::Unchanged => "Order already confirmed",
    };
    Ok(Json(json!({ "success": true, "message": message })))
}

fn refund_message(transition: Transition) -> &'static str {
    match transition {
        Transition::Applied => "Refund request submitted",
        Transition::Unchanged => "Refund already requested",
    }
}

async fn refund(State(state): State<AppState>, user: AuthUser, ApiJson(body): ApiJson<OrderIdRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    let claim = RefundClaim { reason: body.reason, other_reason: body.other_reason, ..Default::default() };
    let (_, transition) = state.orders.request_refund(user.id(), order_id, claim).await?;
    Ok(Json(json!({ "success": true, "message": refund_message(transition) })))
}

async fn request_refund_with_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let order_id = parse_order_id(&order_id)?;
    let form = read_evidence(multipart, &state.limits).await?;
    let submission = RefundSubmission { reason: form.text("reason"), other_reason: form.text("otherReason"), media: form.media };
    let (order, transition) = state.intake.request_refund(user.id(), order_id, submission).await?;
    Ok(Json(json!({ "success": true, "message": refund_message(transition), "order": OrderView::from(&order) })))
}

async fn list_all(State(state): State<AppState>, _: AdminAccess) -> Result<Json<Value>> {
    let orders = state.orders.list().await?;
    Ok(Json(json!({ "success": true, "orders": views(&orders) })))
}

async fn update_status(State(state): State<AppState>, _: AdminAccess, ApiJson(body): ApiJson<StatusRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    let status: OrderStatus = body.status.parse()?;
    state.orders.update_status(order_id, status).await?;
    Ok(Json(json!({ "success": true, "message": "Status Updated" })))
}

async fn update_status_bulk(State(state): State<AppState>, _: AdminAccess, ApiJson(body): ApiJson<BulkStatusRequest>) -> Result<Json<Value>> {
    body.validate()?;
    let modified = state.orders.bulk_update_status(&body.order_ids, body.status.as_deref()).await?;
    Ok(Json(json!({ "success": true, "modifiedCount": modified })))
}

async fn update_refund_status(State(state): State<AppState>, _: AdminAccess, ApiJson(body): ApiJson<RefundStatusRequest>) -> Result<Json<Value>> {
    let order_id = parse_order_id(&body.order_id)?;
    let status: RefundStatus = body.refund_status.parse()?;
    let order = state.orders.resolve_refund(order_id, status).await?;
    Ok(Json(json!({ "success": true, "order": OrderView::from(&order) })))
}

async fn delete_order(State(state): State<AppState>, _: AdminAccess, ApiJson(body): ApiJson<DeleteRequest>) -> Result<Json<Value>> {
    let id = parse_order_id(&body.id)?;
    state.orders.delete(id).await?;
    Ok(Json(json!({ "success": true, "message": "Order Removed" })))
}
