// Cookielens Engine — OpenAI-Compatible Provider
// Handles: OpenAI and any chat-completions-compatible REST API (local LMs
// included — an empty API key simply sends no Authorization header).
//
// One request per classification, 30-second bound, no retries: a failed
// task is simply resubmittable, and blanket retries would fight the
// pipeline's own rate limiter.

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

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &CoreConfig) -> Self {
        OpenAiProvider {
            // Deliberately bypasses any system/host proxy: classification
            // traffic must never loop back through the intercepting proxy.
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

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(&self, cookie_name: &str, domain: &str) -> Result<ClassifyReply, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": classification_prompt(cookie_name, domain) },
            ],
            "temperature": 0.0,
            "max_tokens": 500,
        });

        info!("[provider] openai classify {} via {}", cookie_name, url);
        let response = self
            .authorize(self.client.post(&url).header("Content-Type", "application/json"))
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
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Parse("missing choices[0].message.content".into()))?;

        let descriptor = parse_descriptor(cookie_name, content)?;
        Ok(ClassifyReply { descriptor, raw_response: content.to_string() })
    }

    /// `GET <base>/models` → `{ "data": [ { "id": … }, … ] }`.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let response = self
            .authorize(self.client.get(&url))
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
        let models = value["data"]
            .as_array()
            .ok_or_else(|| ProviderError::Parse("missing data array".into()))?
            .iter()
            .filter_map(|entry| entry["id"].as_str())
            .map(|id| id.to_string())
            .collect();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> CoreConfig {
        CoreConfig {
            ai_endpoint: endpoint.map(|s| s.to_string()),
            api_key: "sk-test".into(),
            model: "gpt-4".into(),
            ..CoreConfig::default()
        }
    }

    #[test]
    fn endpoint_defaults_and_overrides() {
        let provider = OpenAiProvider::new(&config(None));
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        let local = OpenAiProvider::new(&config(Some("http://localhost:11434/v1")));
        assert_eq!(local.base_url, "http://localhost:11434/v1");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Nothing listens on this port; the connect attempt fails fast.
        let provider = OpenAiProvider::new(&config(Some("http://127.0.0.1:9/v1")));
        match provider.classify("_ga", "example.com").await {
            Err(ProviderError::Transport(_)) => {}
            other => panic!("expected a transport error, got {:?}", other.map(|r| r.raw_response)),
        }
    }
}
