// ── Cookielens Atoms: Trait Seams ──────────────────────────────────────────
// The three interfaces the engine is built against:
//   • ReplayTransport — the host's replay primitive (one request in, one
//     response out), consumed by the solver through the Replayer.
//   • ProxyHost — everything else the host proxy offers: scope checks,
//     traffic history, preferences, per-project persistence. Logging is not
//     part of this trait; the crate emits through the `log` facade and the
//     host adapter installs the sink.
//   • AiProvider — the language-model adapter, implemented once per wire
//     shape (chat-completions vs messages) and selected by configuration.

use async_trait::async_trait;
use thiserror::Error;

use crate::atoms::classify_types::Descriptor;
use crate::atoms::types::RequestTemplate;

// ── Replay transport ───────────────────────────────────────────────────────

/// Raw response handed back by the host's replay primitive.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out")]
    Timeout,
}

/// One-shot request sender. No retries, no interpretation — retry policy
/// belongs to the solver.
#[async_trait]
pub trait ReplayTransport: Send + Sync {
    async fn send(&self, request: &RequestTemplate) -> Result<TransportResponse, TransportError>;
}

// ── Host proxy collaborator ────────────────────────────────────────────────

/// A captured response from the host's traffic history.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// One request/response pair from the host's traffic history. The response
/// is absent when the host never saw one.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    pub request: RequestTemplate,
    pub response: Option<CapturedResponse>,
}

/// The host proxy's non-replay surface.
///
/// Implementations must be cheap to call: the passive classifier hook calls
/// `is_in_scope` on the hot path.
pub trait ProxyHost: Send + Sync {
    fn is_in_scope(&self, url: &str) -> bool;

    /// Past captured traffic, oldest first.
    fn history(&self) -> Vec<CapturedExchange>;

    /// Typed-by-string host preference surface.
    fn pref_get(&self, key: &str) -> Option<String>;
    fn pref_set(&self, key: &str, value: &str);

    /// Per-project persistence, used only for solver verdicts.
    fn persist(&self, key: &str, value: &str);
    fn load(&self, key: &str) -> Option<String>;
}

// ── Language-model provider ────────────────────────────────────────────────

/// Provider-layer error. Folded into `CoreError::Provider` at the pipeline
/// boundary; the worker logs it and moves on.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection-level failure (DNS, TLS, timeout).
    #[error("transport: {0}")]
    Transport(String),
    /// Non-2xx API response.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    /// 401 / 403 — never worth resubmitting with the same key.
    #[error("auth: {0}")]
    Auth(String),
    /// 429 from the service itself (distinct from our own token bucket).
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The reply arrived but its JSON payload was unusable.
    #[error("parse: {0}")]
    Parse(String),
}

/// A successful classification: the structured descriptor plus the raw
/// reply text, kept verbatim for the audit cache.
#[derive(Debug, Clone)]
pub struct ClassifyReply {
    pub descriptor: Descriptor,
    pub raw_response: String,
}

/// The language-model adapter. One implementation per wire shape.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short provider name for logs ("openai", "anthropic").
    fn name(&self) -> &str;

    /// Describe one cookie. One HTTP call, 30-second bound, no retries.
    async fn classify(&self, cookie_name: &str, domain: &str) -> Result<ClassifyReply, ProviderError>;

    /// Model ids for UI selectors. Profiles without a listing endpoint
    /// return a static list.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}
