use std::collections::HashMap;

use anyhow::Result;

use crate::{
    error::{ChunkingError, ConfigurationError, ReviewError},
    provider::{Provider, ProviderConfig},
};

/// Full application configuration.
/// Read from the process environment first, then `.env` in the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    // Default provider selection (requests may override)
    pub provider: Provider,
    pub api_key: String,
    pub model: String,

    // Upstream hosts, overridable for proxies and tests
    pub deepseek_base_url: String,
    pub doubao_base_url: String,
    pub tongyi_base_url: String,

    // Review tuning
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub request_timeout_s: u64,
    pub max_tokens: u32,
    pub outline_delay_ms: u64,
    pub review_concurrency: usize,

    // Storage / web
    pub data_dir: String,
    pub web_bind: String,
    pub web_port: u16,
}

/// Knobs the aggregator needs for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSettings {
    pub window_size: usize,
    pub overlap: usize,
    pub outline_delay_ms: u64,
    /// Units in flight at once in standard mode. 1 = strictly sequential.
    pub concurrency: usize,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            window_size: 8000,
            overlap: 200,
            outline_delay_ms: 1000,
            concurrency: 1,
        }
    }
}

impl ReviewSettings {
    pub fn validate(&self) -> Result<(), ReviewError> {
        if self.window_size == 0 {
            return Err(ChunkingError::ZeroWindow.into());
        }
        if self.overlap >= self.window_size {
            return Err(ChunkingError::OverlapTooLarge {
                window_size: self.window_size,
                overlap: self.overlap,
            }
            .into());
        }
        if self.concurrency == 0 {
            return Err(ConfigurationError::InvalidSetting {
                name: "concurrency",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        Ok(())
    }
}

/// Transport options for one provider's HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl GatewayOptions {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            base_url: provider.spec().default_base_url.to_string(),
            timeout_secs: 60,
            max_tokens: 4096,
        }
    }
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_parsed<T: std::str::FromStr>(key: &str, dotenv: &HashMap<String, String>, default: T) -> T {
    get(key, dotenv)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_map(&parse_dotenv())
    }

    /// Builds a config from `dotenv` values, with the process env taking
    /// precedence for every key.
    pub fn from_map(dotenv: &HashMap<String, String>) -> Result<Self> {
        let provider: Provider = get_str("REDLINE_PROVIDER", dotenv, "deepseek").parse()?;
        let defaults = ReviewSettings::default();

        let config = Config {
            provider,
            api_key: get_str("REDLINE_API_KEY", dotenv, ""),
            model: get_str("REDLINE_MODEL", dotenv, ""),
            deepseek_base_url: get_str(
                "DEEPSEEK_BASE_URL",
                dotenv,
                Provider::Deepseek.spec().default_base_url,
            ),
            doubao_base_url: get_str(
                "DOUBAO_BASE_URL",
                dotenv,
                Provider::Doubao.spec().default_base_url,
            ),
            tongyi_base_url: get_str(
                "TONGYI_BASE_URL",
                dotenv,
                Provider::Tongyi.spec().default_base_url,
            ),
            chunk_size: get_parsed("CHUNK_SIZE", dotenv, defaults.window_size),
            chunk_overlap: get_parsed("CHUNK_OVERLAP", dotenv, defaults.overlap),
            request_timeout_s: get_parsed("REQUEST_TIMEOUT_S", dotenv, 60),
            max_tokens: get_parsed("MAX_TOKENS", dotenv, 4096),
            outline_delay_ms: get_parsed("OUTLINE_DELAY_MS", dotenv, defaults.outline_delay_ms),
            review_concurrency: get_parsed("REVIEW_CONCURRENCY", dotenv, defaults.concurrency),
            data_dir: get_str("DATA_DIR", dotenv, "store"),
            web_bind: get_str("WEB_BIND", dotenv, "127.0.0.1"),
            web_port: get_parsed("WEB_PORT", dotenv, 3232),
        };
        config.review_settings()?;
        Ok(config)
    }

    /// Validated aggregator settings.
    pub fn review_settings(&self) -> Result<ReviewSettings, ReviewError> {
        let settings = ReviewSettings {
            window_size: self.chunk_size,
            overlap: self.chunk_overlap,
            outline_delay_ms: self.outline_delay_ms,
            concurrency: self.review_concurrency,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::Deepseek => &self.deepseek_base_url,
            Provider::Doubao => &self.doubao_base_url,
            Provider::Tongyi => &self.tongyi_base_url,
        }
    }

    pub fn gateway_options(&self, provider: Provider) -> GatewayOptions {
        GatewayOptions {
            base_url: self.base_url(provider).trim_end_matches('/').to_string(),
            timeout_secs: self.request_timeout_s,
            max_tokens: self.max_tokens,
        }
    }

    /// The configured default provider selection, if it carries a key.
    pub fn default_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.is_empty() {
            return None;
        }
        let mut cfg = ProviderConfig::new(self.provider, self.api_key.clone());
        if !self.model.is_empty() {
            cfg.model = Some(self.model.clone());
        }
        Some(cfg)
    }
}
