//! OpenSASE Storefront - Self-hosted storefront service

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_storefront::ai::{AdapterClient, Embedder, LanguageModel, OllamaClient};
use opensase_storefront::config::{AiBackend, AppConfig};
use opensase_storefront::media::LocalBlobStore;
use opensase_storefront::payments::{PayPalGateway, PaymentGateway, StripeGateway};
use opensase_storefront::services::{EventPublisher, LogPublisher, NatsPublisher};
use opensase_storefront::storage::{PgKnowledgeStore, PgStorage};
use opensase_storefront::{router, AppState, Backends, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = AppConfig::from_env().context("loading configuration")?;

    let db = PgPoolOptions::new().max_connections(10).connect(config.database_url.expose_secret()).await?;
    let storage = Arc::new(PgStorage::new(db.clone()));
    storage.migrate().await.context("running migrations")?;
    let knowledge = Arc::new(PgKnowledgeStore::open(db, config.ai.embed_dim).await.context("opening knowledge store")?);

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, logging events instead");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let ollama = Arc::new(OllamaClient::new(&config.ai.ollama_url, &config.ai.chat_model, &config.ai.embed_model));
    let model: Arc<dyn LanguageModel> = match config.ai.backend {
        AiBackend::Adapter => Arc::new(AdapterClient::new(&config.ai.adapter_url, config.ai.adapter_timeout, config.ai.max_new_tokens)?),
        AiBackend::Ollama => ollama.clone(),
    };
    let embedder: Arc<dyn Embedder> = ollama;

    let mut gateways: Vec<Arc<dyn PaymentGateway>> = Vec::new();
    if let Some(stripe) = &config.stripe {
        gateways.push(Arc::new(StripeGateway::new(stripe, &config.currency)));
    }
    if let Some(paypal) = &config.paypal {
        gateways.push(Arc::new(PayPalGateway::new(paypal, &config.currency)));
    }

    tokio::fs::create_dir_all(&config.upload_dir).await.context("creating upload directory")?;
    let backends = Backends {
        orders: storage.clone(),
        products: storage.clone(),
        carts: storage.clone(),
        reviews: storage,
        knowledge,
        blobs: Arc::new(LocalBlobStore::new(&config.upload_dir)),
        embedder,
        model,
        events,
        gateways,
    };
    let app = router(AppState::new(backends, Settings::from_config(&config)));

    let addr = config.socket_addr();
    tracing::info!("🚀 OpenSASE Storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
