use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Deepseek,
    Doubao,
    Tongyi,
}

/// Static routing data for one OpenAI-compatible provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub endpoint_path: &'static str,
    pub default_model: &'static str,
    pub default_base_url: &'static str,
}

const PROVIDERS: [ProviderSpec; 3] = [
    ProviderSpec {
        key: "deepseek",
        label: "DeepSeek",
        endpoint_path: "/chat/completions",
        default_model: "deepseek-chat",
        default_base_url: "https://api.deepseek.com",
    },
    ProviderSpec {
        key: "doubao",
        label: "Doubao",
        endpoint_path: "/api/v3/chat/completions",
        default_model: "doubao-pro-32k",
        default_base_url: "https://ark.cn-beijing.volces.com",
    },
    ProviderSpec {
        key: "tongyi",
        label: "Tongyi Qianwen",
        endpoint_path: "/compatible-mode/v1/chat/completions",
        default_model: "qwen-turbo",
        default_base_url: "https://dashscope.aliyuncs.com",
    },
];

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Deepseek, Provider::Doubao, Provider::Tongyi];

    pub fn spec(&self) -> &'static ProviderSpec {
        match self {
            Self::Deepseek => &PROVIDERS[0],
            Self::Doubao => &PROVIDERS[1],
            Self::Tongyi => &PROVIDERS[2],
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.spec().key
    }

    pub fn table() -> &'static [ProviderSpec] {
        &PROVIDERS
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == key)
            .ok_or_else(|| ConfigurationError::UnknownProvider(s.to_string()))
    }
}

/// Caller-supplied provider selection. Never mutated by the review code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigurationError::MissingApiKey(self.provider.to_string()));
        }
        Ok(())
    }

    /// The explicit model, or the provider's default when unset or blank.
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.provider.spec().default_model)
    }
}

// Keeps API keys out of Debug output and therefore out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &mask_key(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

/// `sk-1…abcd` style mask; short keys are fully hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
