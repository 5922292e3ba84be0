// Cookielens Engine — Anthropic Claude Provider
// Messages-shaped wire format: system prompt as a top-level field,
// authentication via x-api-key plus a pinned anthropic-version header.

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::atoms::constants::LM_TIMEOUT;
use crate::atoms::traits::{AiProvider, ClassifyReply, ProviderError};
use crate::engine::config::CoreConfig;
use crate::engine::providers::{
    classification_prompt, parse_descriptor, status_error, SYSTEM_PROMPT,
};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version pinned alongside the wire format. Bump together with any
/// change to the request body shape.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The messages profile has no listing endpoint worth depending on; the
/// UI selector falls back to this set.
const FALLBACK_MODELS: &[&str] =
    &["claude-sonnet-4-5", "claude-opus-4-1", "claude-3-5-haiku-latest"];

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(config: &CoreConfig) -> Self {
        AnthropicProvider {
            // Same rule as the chat-completions profile: never route
            // classification traffic back through the intercepting proxy.
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(LM_TIMEOUT)
                .no_proxy()
                .build()
                .unwrap_or_default(),
            base_url: config
                .ai_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn classify(&self, cookie_name: &str, domain: &str) -> Result<ClassifyReply, ProviderError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "messages": [
                { "role": "user", "content": classification_prompt(cookie_name, domain) },
            ],
            "temperature": 0,
            "max_tokens": 1024,
        });

        info!("[provider] anthropic classify {} via {}", cookie_name, url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body_text));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("response is not JSON: {}", e)))?;
        let content = value["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::Parse("missing content[0].text".into()))?;

        let descriptor = parse_descriptor(cookie_name, content)?;
        Ok(ClassifyReply { descriptor, raw_response: content.to_string() })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(FALLBACK_MODELS.iter().map(|m| m.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn model_listing_is_static() {
        let provider = AnthropicProvider::new(&CoreConfig::default());
        let models = provider.list_models().await.unwrap();
        assert!(!models.is_empty());
        assert!(models.iter().all(|m| m.starts_with("claude")));
    }

    #[test]
    fn endpoint_override_applies() {
        let config = CoreConfig {
            ai_provider: "Anthropic".into(),
            ai_endpoint: Some("https://gateway.internal/v1".into()),
            ..CoreConfig::default()
        };
        let provider = AnthropicProvider::new(&config);
        assert_eq!(provider.base_url, "https://gateway.internal/v1");
    }
}
