// Cookielens Engine — AI Provider Registry
// AnyProvider wraps Box<dyn AiProvider> so adding a new provider
// never requires modifying a factory enum — just implement the trait.
//
// The prompt and the reply-parsing rules live here because they are shared
// by every wire shape: the JSON document expected back from the model is
// part of the interface contract, and changing it invalidates the raw
// replies kept in the audit cache.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde_json::Value;

use crate::atoms::classify_types::{CookieCategory, Descriptor, DescriptorSource, PrivacyLevel};
use crate::atoms::constants::DEFAULT_CONFIDENCE;
use crate::atoms::traits::{AiProvider, ClassifyReply, ProviderError};
use crate::engine::config::CoreConfig;

// ── Provider factory ───────────────────────────────────────────────────────

/// Type-erased AI provider. Callers hold `AnyProvider` and call
/// `.classify()` without knowing which concrete backend is in use.
pub struct AnyProvider(Box<dyn AiProvider>);

impl AnyProvider {
    /// Construct the right concrete provider from the configuration.
    /// Anything that is not the messages-shaped profile speaks the
    /// chat-completions shape, bearer auth included.
    pub fn from_config(config: &CoreConfig) -> Self {
        let provider: Box<dyn AiProvider> =
            match config.ai_provider.trim().to_ascii_lowercase().as_str() {
                "anthropic" | "claude" => Box::new(AnthropicProvider::new(config)),
                _ => Box::new(OpenAiProvider::new(config)),
            };
        AnyProvider(provider)
    }
}

#[async_trait]
impl AiProvider for AnyProvider {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn classify(&self, cookie_name: &str, domain: &str) -> Result<ClassifyReply, ProviderError> {
        self.0.classify(cookie_name, domain).await
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.0.list_models().await
    }
}

// ── Shared prompt ──────────────────────────────────────────────────────────

pub(crate) const SYSTEM_PROMPT: &str = "You are a web cookie classification service. \
Given a cookie name and the domain it was observed on, describe the cookie. \
Respond with a single JSON object and no surrounding prose, using these fields: \
vendor (string), category (one of Essential, Analytics, Advertising, Functional, \
Performance, SocialMedia, Security, Personalization, Unknown), purpose (string), \
privacy_level (one of Low, Medium, High, Critical), third_party (boolean), \
typical_expiration (string), common_domains (array of strings), notes (string), \
confidence (number between 0 and 1).";

pub(crate) fn classification_prompt(cookie_name: &str, domain: &str) -> String {
    format!(
        "Classify the HTTP cookie named \"{}\" observed on the domain \"{}\".",
        cookie_name, domain
    )
}

// ── Shared reply parsing ───────────────────────────────────────────────────

/// Strip a fenced code block (``` or ```json) wrapper, if present.
pub(crate) fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = match rest.find('\n') {
        Some(at) => &rest[at + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Parse the model's JSON document into a descriptor for `cookie_name`.
/// Optional fields may be missing; a missing confidence defaults to 0.7.
pub(crate) fn parse_descriptor(cookie_name: &str, content: &str) -> Result<Descriptor, ProviderError> {
    let document = strip_code_fences(content);
    let value: Value = serde_json::from_str(document)
        .map_err(|e| ProviderError::Parse(format!("reply is not a JSON object: {}", e)))?;
    if !value.is_object() {
        return Err(ProviderError::Parse("reply is not a JSON object".into()));
    }

    let text = |key: &str| value[key].as_str().unwrap_or_default().to_string();
    let common_domains = match &value["common_domains"] {
        Value::Array(entries) => entries
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    let confidence = value["confidence"].as_f64().unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0);
    let now = chrono::Utc::now().to_rfc3339();

    Ok(Descriptor {
        name: cookie_name.to_string(),
        vendor: text("vendor"),
        category: CookieCategory::parse(value["category"].as_str().unwrap_or_default()),
        purpose: text("purpose"),
        privacy: PrivacyLevel::parse(value["privacy_level"].as_str().unwrap_or_default()),
        third_party: value["third_party"].as_bool().unwrap_or(false),
        typical_expiration: text("typical_expiration"),
        common_domains,
        notes: text("notes"),
        confidence,
        source: DescriptorSource::Ai,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Map a non-2xx response to the right provider error.
pub(crate) fn status_error(status: u16, body: &str) -> ProviderError {
    let message = truncate(body, 200);
    match status {
        401 | 403 => ProviderError::Auth(format!("API error {}: {}", status, message)),
        429 => ProviderError::RateLimited(message),
        _ => ProviderError::Api { status, message },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

// ── Tests ──────────────────────────────────────────────────────────────────
