//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `HOST` / `PORT` - Bind address (default: 0.0.0.0:4000)
//! - `UPLOAD_DIR` - Root for refund and review media (default: uploads)
//! - `MAX_UPLOAD_BYTES` - Per-file ceiling (default: 20 MiB)
//! - `CURRENCY` - Checkout currency code (default: usd)
//! - `DELIVERY_CHARGE` - Flat delivery fee in major units (default: 1.00)
//! - `FRONTEND_URL` - Storefront origin for payment return URLs when the request has no `Origin` header (default: http://localhost:5173)
//! - `ADMIN_TOKEN` - Shared secret for admin routes; admin routes refuse all callers when unset
//! - `STRIPE_SECRET_KEY`, `STRIPE_API_BASE` - Enables card checkout through Stripe
//! - `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_MODE` - Enables PayPal (sandbox|live)
//! - `NATS_URL` - Publish domain events to NATS instead of the log
//! - `AI_BACKEND` - `adapter` (default) or `ollama`
//! - `AI_PY_URL`, `AI_PY_TIMEOUT_MS`, `AI_MAX_NEW_TOKENS` - Adapter service settings
//! - `OLLAMA_URL`, `AI_MODEL`, `AI_EMBED_MODEL` - Ollama settings
//! - `EMBED_DIM` - Knowledge vector dimension (default: 768)
//! - `ASSISTANT_LANGUAGE`, `STORE_NAME` - Assistant persona

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::domain::value_objects::to_minor_units;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` connection URL (contains password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub currency: String,
    /// Flat delivery fee added to every order, in minor units
    pub delivery_charge_minor: i64,
    pub frontend_url: String,
    pub admin_token: Option<SecretString>,
    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PayPalConfig>,
    pub nats_url: Option<String>,
    pub ai: AiConfig,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub mode: PayPalMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalMode { Sandbox, Live }

impl PayPalConfig {
    pub fn api_base(&self) -> &'static str {
        match self.mode {
            PayPalMode::Sandbox => "https://api-m.sandbox.paypal.com",
            PayPalMode::Live => "https://api-m.paypal.com",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiBackend { Adapter, Ollama }

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub backend: AiBackend,
    pub adapter_url: String,
    pub adapter_timeout: Duration,
    pub max_new_tokens: u32,
    pub ollama_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub embed_dim: usize,
    pub language: String,
    pub store_name: String,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let database_url = SecretString::from(env.required("DATABASE_URL")?);
        let host = env.parsed("HOST", "0.0.0.0")?;
        let port = env.parsed("PORT", "4000")?;
        let delivery: f64 = env.parsed("DELIVERY_CHARGE", "1.00")?;
        if !delivery.is_finite() || delivery < 0.0 {
            return Err(ConfigError::InvalidEnvVar("DELIVERY_CHARGE".into(), "must be a non-negative amount".into()));
        }

        let stripe = env.optional("STRIPE_SECRET_KEY").map(|key| StripeConfig {
            secret_key: SecretString::from(key),
            api_base: env.or_default("STRIPE_API_BASE", "https://api.stripe.com"),
        });

        let paypal = match (env.optional("PAYPAL_CLIENT_ID"), env.optional("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(secret)) => {
                let mode = match env.or_default("PAYPAL_MODE", "sandbox").to_lowercase().as_str() {
                    "sandbox" => PayPalMode::Sandbox,
                    "live" => PayPalMode::Live,
                    other => return Err(ConfigError::InvalidEnvVar("PAYPAL_MODE".into(), format!("unknown mode '{other}'"))),
                };
                Some(PayPalConfig { client_id, client_secret: SecretString::from(secret), mode })
            }
            _ => None,
        };

        let backend = match env.or_default("AI_BACKEND", "adapter").to_lowercase().as_str() {
            "adapter" => AiBackend::Adapter,
            "ollama" => AiBackend::Ollama,
            other => return Err(ConfigError::InvalidEnvVar("AI_BACKEND".into(), format!("unknown backend '{other}'"))),
        };
        let embed_dim: usize = env.parsed("EMBED_DIM", "768")?;
        if embed_dim == 0 {
            return Err(ConfigError::InvalidEnvVar("EMBED_DIM".into(), "must be positive".into()));
        }

        let ai = AiConfig {
            backend,
            adapter_url: env.or_default("AI_PY_URL", "http://127.0.0.1:8000").trim_end_matches('/').to_string(),
            adapter_timeout: Duration::from_millis(env.parsed("AI_PY_TIMEOUT_MS", "300000")?),
            max_new_tokens: env.parsed("AI_MAX_NEW_TOKENS", "96")?,
            ollama_url: env.or_default("OLLAMA_URL", "http://localhost:11434").trim_end_matches('/').to_string(),
            chat_model: env.or_default("AI_MODEL", "llama3"),
            embed_model: env.or_default("AI_EMBED_MODEL", "nomic-embed-text"),
            embed_dim,
            language: env.or_default("ASSISTANT_LANGUAGE", "English"),
            store_name: env.or_default("STORE_NAME", "OpenSASE Store"),
        };

        Ok(Self {
            database_url,
            host,
            port,
            upload_dir: PathBuf::from(env.or_default("UPLOAD_DIR", "uploads")),
            max_upload_bytes: env.parsed("MAX_UPLOAD_BYTES", "20971520")?,
            currency: env.or_default("CURRENCY", "usd").to_lowercase(),
            delivery_charge_minor: to_minor_units(delivery),
            frontend_url: env.or_default("FRONTEND_URL", "http://localhost:5173").trim_end_matches('/').to_string(),
            admin_token: env.optional("ADMIN_TOKEN").map(SecretString::from),
            stripe,
            paypal,
            nats_url: env.optional("NATS_URL"),
            ai,
        })
    }

    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[("DATABASE_URL", "postgres://localhost/store")]).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.delivery_charge_minor, 100);
        assert_eq!(cfg.frontend_url, "http://localhost:5173");
        assert_eq!(cfg.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(cfg.ai.embed_dim, 768);
        assert_eq!(cfg.ai.adapter_timeout, Duration::from_millis(300_000));
        assert_eq!(cfg.ai.max_new_tokens, 96);
        assert_eq!(cfg.ai.backend, AiBackend::Adapter);
        assert!(cfg.stripe.is_none() && cfg.paypal.is_none() && cfg.admin_token.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(k)) if k == "DATABASE_URL"));
        assert!(matches!(load(&[("DATABASE_URL", "  ")]), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_providers_and_invalid_values() {
        let cfg = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("PAYPAL_CLIENT_ID", "id"),
            ("PAYPAL_CLIENT_SECRET", "secret"),
            ("PAYPAL_MODE", "LIVE"),
            ("ADMIN_TOKEN", "tok"),
            ("DELIVERY_CHARGE", "2.5"),
        ]).unwrap();
        assert_eq!(cfg.stripe.unwrap().secret_key.expose_secret(), "sk_test_1");
        assert_eq!(cfg.paypal.unwrap().api_base(), "https://api-m.paypal.com");
        assert_eq!(cfg.delivery_charge_minor, 250);
        assert!(matches!(load(&[("DATABASE_URL", "x"), ("PORT", "abc")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
        assert!(load(&[("DATABASE_URL", "x"), ("AI_BACKEND", "gpt")]).is_err());
    }
}
