use std::time::Duration;

use async_trait::async_trait;
use redline_core::{
    config::GatewayOptions,
    error::{ConfigurationError, GatewayError},
    gateway::{ChatGateway, ChatRequest},
    provider::ProviderConfig,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Calls one of the OpenAI-compatible chat-completion providers.
///
/// Stateless apart from the HTTP client, which callers may share so
/// connections are pooled across runs: every call carries the full prompt,
/// no streaming, no retries. The per-call timeout is applied per request.
/// The configuration is validated at construction so a missing key fails
/// before any unit is attempted.
pub struct ProviderClient {
    config: ProviderConfig,
    options: GatewayOptions,
    client: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig, options: GatewayOptions) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigurationError::InvalidSetting {
                name: "http_client",
                reason: e.to_string(),
            })?;
        Self::with_client(config, options, client)
    }

    /// Uses an existing (usually shared) client.
    pub fn with_client(
        config: ProviderConfig,
        options: GatewayOptions,
        client: reqwest::Client,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config,
            options,
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.options.base_url.trim_end_matches('/'),
            self.config.provider.spec().endpoint_path
        )
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[async_trait]
impl ChatGateway for ProviderClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let model = self.config.effective_model();
        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: self.options.max_tokens,
            stream: false,
        };

        let provider = self.config.provider;
        info!(
            provider = %provider,
            model = %model,
            prompt_len = request.prompt.len(),
            "calling chat completion API"
        );

        let response = match self
            .client
            .post(self.endpoint())
            .timeout(Duration::from_secs(self.options.timeout_secs))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(
                    provider = %provider,
                    timeout_secs = self.options.timeout_secs,
                    "chat completion request timed out"
                );
                return Err(GatewayError::Timeout(self.options.timeout_secs));
            },
            Err(e) => {
                warn!(provider = %provider, "chat completion request failed: {}", e);
                return Err(GatewayError::Connectivity(e.without_url().to_string()));
            },
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) if e.is_timeout() => return Err(GatewayError::Timeout(self.options.timeout_secs)),
            Err(e) => return Err(GatewayError::Connectivity(e.without_url().to_string())),
        };

        if !status.is_success() {
            warn!(provider = %provider, status = %status, "provider returned non-2xx: {}", text);
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = parse_completion(&text)?;
        info!(
            provider = %provider,
            model = %model,
            output_len = content.len(),
            "chat completion received"
        );
        Ok(content)
    }
}

/// `choices[0].message.content` of a completion body. Some providers answer
/// 200 with an `error` object instead of choices.
pub fn parse_completion(body: &str) -> Result<String, GatewayError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| GatewayError::MalformedReply(format!("body is not JSON: {e}")))?;

    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(GatewayError::ProviderReported(message));
    }

    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::MalformedReply("missing choices[0].message.content".into()))
}
