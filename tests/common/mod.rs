//! Shared test fixtures: the router over in-memory storage with fake
//! providers and models.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use opensase_storefront::ai::{AiError, AssistantSettings, ChatPrompt, Embedder, LanguageModel};
use opensase_storefront::domain::aggregates::{Order, PaymentMethod, Product};
use opensase_storefront::domain::value_objects::PriceBreakdown;
use opensase_storefront::media::{MediaLimits, MemoryBlobStore};
use opensase_storefront::payments::{PaymentError, PaymentGateway, PaymentOutcome, RedirectTarget, ReturnUrls};
use opensase_storefront::services::RecordingPublisher;
use opensase_storefront::storage::{MemoryKnowledgeStore, MemoryStorage};
use opensase_storefront::{router, AppState, Backends, Settings};

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const DIM: usize = 4;

/// Replays scripted answers, then repeats the fallback.
#[derive(Default)]
pub struct FakeModel {
    answers: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: AtomicUsize,
}

impl FakeModel {
    pub fn answering(fallback: &str) -> Self {
        Self { fallback: fallback.to_string(), ..Default::default() }
    }

    pub fn push(&self, answer: Result<&str, &str>) {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer.map(str::to_string).map_err(str::to_string));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn chat(&self, _prompt: &ChatPrompt) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.answers.lock().ok().and_then(|mut a| a.pop_front());
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(message)) => Err(AiError::Upstream(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Maps text to a fixed-size vector; "refund"/"ship" land on separate axes.
#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut v = vec![0.1; DIM];
        if lower.contains("refund") || lower.contains("return") {
            v[0] = 1.0;
        }
        if lower.contains("ship") {
            v[1] = 1.0;
        }
        Ok(v)
    }
}

/// Stripe stand-in: session `cs_paid` settles, anything else fails.
pub struct FakeStripe;

#[async_trait]
impl PaymentGateway for FakeStripe {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn create_checkout(&self, order: &Order, _price: &PriceBreakdown, _urls: &ReturnUrls) -> Result<RedirectTarget, PaymentError> {
        Ok(RedirectTarget { url: format!("https://checkout.test/{}", order.id()), provider_ref: "cs_paid".into() })
    }

    async fn capture(&self, provider_ref: &str) -> Result<PaymentOutcome, PaymentError> {
        Ok(if provider_ref == "cs_paid" { PaymentOutcome::Settled } else { PaymentOutcome::Failed })
    }
}

/// PayPal stand-in: token `EC-OK` captures, anything else is refused with 422.
pub struct FakePayPal;

#[async_trait]
impl PaymentGateway for FakePayPal {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    async fn create_checkout(&self, order: &Order, _price: &PriceBreakdown, _urls: &ReturnUrls) -> Result<RedirectTarget, PaymentError> {
        Ok(RedirectTarget { url: format!("https://paypal.test/approve/{}", order.id()), provider_ref: "EC-OK".into() })
    }

    async fn capture(&self, token: &str) -> Result<PaymentOutcome, PaymentError> {
        if token == "EC-OK" {
            return Ok(PaymentOutcome::Settled);
        }
        Err(PaymentError::Provider { provider: "PayPal", status: 422, message: "ORDER_NOT_APPROVED".into() })
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub storage: MemoryStorage,
    pub knowledge: Arc<MemoryKnowledgeStore>,
    pub blobs: MemoryBlobStore,
    pub model: Arc<FakeModel>,
    pub embedder: Arc<FakeEmbedder>,
    pub events: RecordingPublisher,
}

pub async fn spawn_app() -> TestApp {
    spawn_with_model(FakeModel::answering("We ship nationwide within 2 to 7 days.")).await
}

pub async fn spawn_with_model(model: FakeModel) -> TestApp {
    spawn_with(model, vec![Arc::new(FakeStripe)]).await
}

pub async fn spawn_with_paypal() -> TestApp {
    spawn_with(FakeModel::answering("ok"), vec![Arc::new(FakeStripe), Arc::new(FakePayPal)]).await
}

async fn spawn_with(model: FakeModel, gateways: Vec<Arc<dyn PaymentGateway>>) -> TestApp {
    let storage = MemoryStorage::new();
    storage.put_product(Product::new("P1", "Figure", 10.0).with_stock(10).with_description("Collectible figure")).await;
    storage.put_product(Product::new("P2", "Mask", 4.5).with_stock(3)).await;

    let knowledge = Arc::new(MemoryKnowledgeStore::new(DIM));
    let blobs = MemoryBlobStore::new();
    let model = Arc::new(model);
    let embedder = Arc::new(FakeEmbedder::default());
    let events = RecordingPublisher::new();
    let backends = Backends {
        orders: Arc::new(storage.clone()),
        products: Arc::new(storage.clone()),
        carts: Arc::new(storage.clone()),
        reviews: Arc::new(storage.clone()),
        knowledge: knowledge.clone(),
        blobs: Arc::new(blobs.clone()),
        embedder: embedder.clone(),
        model: model.clone(),
        events: Arc::new(events.clone()),
        gateways,
    };
    let settings = Settings {
        admin_token: Some(SecretString::from(ADMIN_TOKEN)),
        frontend_url: "http://shop.test".into(),
        upload_dir: PathBuf::from("uploads"),
        limits: MediaLimits { max_file_bytes: 1024, ..Default::default() },
        delivery_charge_minor: 100,
        assistant: AssistantSettings { store_name: "Test Store".into(), language: "English".into() },
    };
    let server = TestServer::new(router(AppState::new(backends, settings))).unwrap();
    TestApp { server, storage, knowledge, blobs, model, embedder, events }
}

pub fn user(id: &'static str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static("x-user-id"), HeaderValue::from_static(id))
}

pub fn admin() -> (HeaderName, HeaderValue) {
    (HeaderName::from_static("token"), HeaderValue::from_static(ADMIN_TOKEN))
}
