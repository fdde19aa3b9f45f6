use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, RwLock},
};

use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use redline_agent::ProviderClient;
use redline_core::{
    config::Config,
    error::ConfigurationError,
    gateway::ChatGateway,
    provider::{Provider, ProviderConfig},
    store::SettingsStore,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod logging;
pub mod proxy;
pub mod routes;

/// Contracts run long; the default 2 MiB extractor limit is too tight.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub config: Arc<Config>,
    pub store: SettingsStore,
    /// Provider configuration remembered from the last `PUT /api/settings`.
    pub remembered: RwLock<Option<ProviderConfig>>,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: Arc<Mutex<VecDeque<String>>>,
    /// Shared by provider calls and the proxy so connections are pooled.
    pub http: reqwest::Client,
}

/// Provider selection as sent by clients. The key may be omitted to reuse
/// the remembered or configured key for the same provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSelection {
    pub provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl AppState {
    pub fn new(
        config: Config,
        log_tx: broadcast::Sender<String>,
        log_ring: Arc<Mutex<VecDeque<String>>>,
    ) -> anyhow::Result<Self> {
        let store = SettingsStore::new(&config.data_dir);
        let remembered = store.load()?;
        Ok(Self {
            config: Arc::new(config),
            store,
            remembered: RwLock::new(remembered),
            log_tx,
            log_ring,
            http: reqwest::Client::new(),
        })
    }

    pub fn remembered(&self) -> Option<ProviderConfig> {
        self.remembered
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remember(&self, config: ProviderConfig) {
        *self.remembered.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
    }

    /// Request selection first, then the remembered settings, then the
    /// process configuration.
    pub fn resolve_provider(
        &self,
        selection: Option<&ProviderSelection>,
    ) -> Result<ProviderConfig, ConfigurationError> {
        let fallbacks: Vec<ProviderConfig> = self
            .remembered()
            .into_iter()
            .chain(self.config.default_provider_config())
            .collect();

        let Some(sel) = selection.filter(|s| s.provider.is_some()) else {
            return fallbacks
                .into_iter()
                .next()
                .ok_or_else(|| ConfigurationError::MissingApiKey(self.config.provider.to_string()));
        };

        let provider: Provider = sel.provider.as_deref().unwrap_or_default().parse()?;
        let key = sel
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                fallbacks
                    .iter()
                    .find(|c| c.provider == provider)
                    .map(|c| c.api_key.clone())
            })
            .unwrap_or_default();

        let mut config = ProviderConfig::new(provider, key);
        config.model = sel.model.clone().filter(|m| !m.trim().is_empty());
        config.validate()?;
        Ok(config)
    }

    pub fn gateway(
        &self,
        selection: Option<&ProviderSelection>,
    ) -> Result<Arc<dyn ChatGateway>, ConfigurationError> {
        let config = self.resolve_provider(selection)?;
        let options = self.config.gateway_options(config.provider);
        Ok(Arc::new(ProviderClient::with_client(
            config,
            options,
            self.http.clone(),
        )?))
    }
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(routes::health))
        // Providers and settings
        .route("/api/providers", get(routes::get_providers))
        .route("/api/settings", get(routes::get_settings).put(routes::put_settings))
        // Review
        .route("/api/review", post(routes::post_review))
        .route("/api/outline", post(routes::post_outline))
        // Reports
        .route("/api/report", post(routes::post_report))
        .route("/api/outline/report", post(routes::post_outline_report))
        // Assist
        .route("/api/assist/company", post(routes::post_assist_company))
        .route("/api/assist/cases", post(routes::post_assist_cases))
        // Provider proxy
        .route("/api/proxy/:provider/*rest", any(proxy::forward))
        // SSE logs
        .route("/api/logs", get(routes::sse_logs))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
