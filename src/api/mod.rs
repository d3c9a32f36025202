//! HTTP surface
//!
//! JSON envelopes `{ success, ... }` under `/api`, stored media under
//! `/uploads`.

pub mod assistant;
pub mod knowledge;
pub mod orders;
pub mod reviews;

use axum::extract::{DefaultBodyLimit, FromRef, Multipart};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::ai::{AssistantSettings, ChatPipeline, Embedder, LanguageModel};
use crate::auth::AdminToken;
use crate::config::AppConfig;
use crate::error::{Result, StoreError};
use crate::media::{BlobStore, MediaBundle, MediaError, MediaKind, MediaLimits, MediaUpload, PUBLIC_PREFIX};
use crate::payments::PaymentGateway;
use crate::services::{CheckoutService, EventPublisher, IntakeService, KnowledgeService, OrderService};
use crate::storage::{CartRepository, KnowledgeStore, OrderRepository, ProductRepository, ReviewRepository};

/// Storage, model and provider handles the services run on.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn LanguageModel>,
    pub events: Arc<dyn EventPublisher>,
    pub gateways: Vec<Arc<dyn PaymentGateway>>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub admin_token: Option<SecretString>,
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    pub limits: MediaLimits,
    pub delivery_charge_minor: i64,
    pub assistant: AssistantSettings,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            admin_token: config.admin_token.clone(),
            frontend_url: config.frontend_url.clone(),
            upload_dir: config.upload_dir.clone(),
            limits: MediaLimits { max_file_bytes: config.max_upload_bytes, ..Default::default() },
            delivery_charge_minor: config.delivery_charge_minor,
            assistant: AssistantSettings { store_name: config.ai.store_name.clone(), language: config.ai.language.clone() },
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub checkout: CheckoutService,
    pub intake: IntakeService,
    pub knowledge: KnowledgeService,
    pub assistant: ChatPipeline,
    pub admin_token: AdminToken,
    /// Origin used for payment return URLs when the request has none.
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    pub limits: MediaLimits,
}

impl AppState {
    pub fn new(backends: Backends, settings: Settings) -> Self {
        let Backends { orders, products, carts, reviews, knowledge, blobs, embedder, model, events, gateways } = backends;
        let lifecycle = OrderService::new(orders.clone(), products.clone(), carts.clone(), events.clone());
        let checkout = gateways.into_iter().fold(
            CheckoutService::new(orders, products.clone(), carts, events.clone(), settings.delivery_charge_minor),
            CheckoutService::with_gateway,
        );
        let intake = IntakeService::new(lifecycle.clone(), products.clone(), reviews, blobs, events, settings.limits);
        let assistant = ChatPipeline::new(knowledge.clone(), embedder.clone(), model, settings.assistant);
        Self {
            orders: lifecycle,
            checkout,
            intake,
            knowledge: KnowledgeService::new(knowledge, embedder, products),
            assistant,
            admin_token: AdminToken(settings.admin_token),
            frontend_url: settings.frontend_url,
            upload_dir: settings.upload_dir,
            limits: settings.limits,
        }
    }
}

impl FromRef<AppState> for AdminToken {
    fn from_ref(state: &AppState) -> Self {
        state.admin_token.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let files = state.limits.max_images + state.limits.max_videos;
    let body_limit = state.limits.max_file_bytes.saturating_mul(files).saturating_add(1024 * 1024);
    let uploads = ServeDir::new(&state.upload_dir);

    let api = Router::new()
        .merge(orders::routes())
        .merge(reviews::routes())
        .merge(assistant::routes())
        .merge(knowledge::routes());

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "healthy", "service": "opensase-storefront" })) }))
        .nest("/api", api)
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Text fields and evidence files of a multipart submission.
#[derive(Debug, Default)]
pub(crate) struct EvidenceForm {
    pub fields: HashMap<String, String>,
    pub media: MediaBundle,
}

impl EvidenceForm {
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
    }

    pub fn optional(&self, name: &str) -> Option<String> {
        Some(self.text(name)).filter(|v| !v.is_empty())
    }
}

/// Files are accepted only in `images` and `video`; their limits are
/// enforced by the intake service.
pub(crate) async fn read_evidence(mut multipart: Multipart, limits: &MediaLimits) -> Result<EvidenceForm> {
    let mut form = EvidenceForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_none() {
            form.fields.insert(name, field.text().await?);
            continue;
        }
        let kind = MediaKind::from_field(&name)?;
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.len() > limits.max_file_bytes {
            return Err(StoreError::from(MediaError::TooLarge { limit: limits.max_file_bytes }));
        }
        form.media.push(MediaUpload { kind, content_type, file_name, bytes: bytes.to_vec() });
    }
    Ok(form)
}
