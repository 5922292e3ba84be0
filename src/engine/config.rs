// ── Cookielens Engine: Configuration ───────────────────────────────────────
// Snapshot of everything the host preference surface controls. Loaded once
// at pipeline construction; changing a value requires rebuilding the
// pipeline (workers, limiter, and filter are sized at construction).

use std::path::PathBuf;

use crate::atoms::constants::{
    DEFAULT_QUERIES_PER_MINUTE, DEFAULT_WORKER_THREADS, MAX_QUERIES_PER_MINUTE, MAX_WORKER_THREADS,
    MIN_QUERIES_PER_MINUTE, MIN_WORKER_THREADS,
};
use crate::atoms::traits::ProxyHost;

// ── Preference keys ────────────────────────────────────────────────────────
// Stable identifiers in the host preference store. Renaming any of these
// orphans existing user settings.

pub const KEY_DB_PATH: &str = "cookiedb.path";
pub const KEY_AUTO_PROCESS: &str = "cookiedb.autoProcess";
pub const KEY_WORKER_THREADS: &str = "cookiedb.workerThreads";
pub const KEY_QUERIES_PER_MINUTE: &str = "cookiedb.queriesPerMinute";
pub const KEY_DOMAIN_FILTER_MODE: &str = "cookiedb.domainFilter.mode";
pub const KEY_DOMAIN_FILTER_DOMAINS: &str = "cookiedb.domainFilter.domains";
pub const KEY_AI_PROVIDER: &str = "cookiedb.ai.provider";
pub const KEY_AI_ENDPOINT: &str = "cookiedb.ai.endpoint";
pub const KEY_API_KEY: &str = "cookiedb.openai.apiKey";
pub const KEY_MODEL: &str = "cookiedb.openai.model";

// ── Domain filter ──────────────────────────────────────────────────────────

/// Which traffic the passive classifier hook accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainFilterMode {
    All,
    InScope,
    CustomList,
}

impl DomainFilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainFilterMode::All => "ALL",
            DomainFilterMode::InScope => "IN_SCOPE",
            DomainFilterMode::CustomList => "CUSTOM_LIST",
        }
    }

    pub fn parse(s: &str) -> DomainFilterMode {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN_SCOPE" => DomainFilterMode::InScope,
            "CUSTOM_LIST" => DomainFilterMode::CustomList,
            _ => DomainFilterMode::All,
        }
    }
}

// ── Config snapshot ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Store file override; `None` means the platform default under the
    /// user's home directory.
    pub db_path: Option<PathBuf>,
    /// Enable the passive classifier hook.
    pub auto_process: bool,
    /// Worker pool size, clamped to 1–10.
    pub worker_threads: usize,
    /// Token-bucket capacity, clamped to 1–60.
    pub queries_per_minute: u32,
    pub domain_filter_mode: DomainFilterMode,
    pub domain_filter_domains: Vec<String>,
    /// Profile selector ("OpenAI", "Anthropic", …).
    pub ai_provider: String,
    /// LM base URL override; `None` means the profile default.
    pub ai_endpoint: Option<String>,
    /// Bearer token / API key. Empty is legal for local LMs.
    pub api_key: String,
    pub model: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            db_path: None,
            auto_process: false,
            worker_threads: DEFAULT_WORKER_THREADS,
            queries_per_minute: DEFAULT_QUERIES_PER_MINUTE,
            domain_filter_mode: DomainFilterMode::All,
            domain_filter_domains: Vec::new(),
            ai_provider: "OpenAI".into(),
            ai_endpoint: None,
            api_key: String::new(),
            model: "gpt-4".into(),
        }
    }
}

impl CoreConfig {
    /// Load a snapshot from the host preference store, applying defaults
    /// and clamping ranges. Unparseable values fall back to defaults.
    pub fn from_host(host: &dyn ProxyHost) -> CoreConfig {
        let defaults = CoreConfig::default();
        let get = |key: &str| host.pref_get(key).filter(|v| !v.trim().is_empty());

        CoreConfig {
            db_path: get(KEY_DB_PATH).map(PathBuf::from),
            auto_process: get(KEY_AUTO_PROCESS)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.auto_process),
            worker_threads: get(KEY_WORKER_THREADS)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(defaults.worker_threads)
                .clamp(MIN_WORKER_THREADS, MAX_WORKER_THREADS),
            queries_per_minute: get(KEY_QUERIES_PER_MINUTE)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(defaults.queries_per_minute)
                .clamp(MIN_QUERIES_PER_MINUTE, MAX_QUERIES_PER_MINUTE),
            domain_filter_mode: get(KEY_DOMAIN_FILTER_MODE)
                .map(|v| DomainFilterMode::parse(&v))
                .unwrap_or(defaults.domain_filter_mode),
            domain_filter_domains: get(KEY_DOMAIN_FILTER_DOMAINS)
                .map(|v| split_domain_list(&v))
                .unwrap_or_default(),
            ai_provider: get(KEY_AI_PROVIDER).unwrap_or(defaults.ai_provider),
            ai_endpoint: get(KEY_AI_ENDPOINT),
            api_key: host.pref_get(KEY_API_KEY).unwrap_or_default(),
            model: get(KEY_MODEL).unwrap_or(defaults.model),
        }
    }

    /// Write the snapshot back to the host preference store.
    pub fn save(&self, host: &dyn ProxyHost) {
        host.pref_set(
            KEY_DB_PATH,
            &self.db_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        );
        host.pref_set(KEY_AUTO_PROCESS, if self.auto_process { "true" } else { "false" });
        host.pref_set(KEY_WORKER_THREADS, &self.worker_threads.to_string());
        host.pref_set(KEY_QUERIES_PER_MINUTE, &self.queries_per_minute.to_string());
        host.pref_set(KEY_DOMAIN_FILTER_MODE, self.domain_filter_mode.as_str());
        host.pref_set(KEY_DOMAIN_FILTER_DOMAINS, &self.domain_filter_domains.join(","));
        host.pref_set(KEY_AI_PROVIDER, &self.ai_provider);
        host.pref_set(KEY_AI_ENDPOINT, self.ai_endpoint.as_deref().unwrap_or(""));
        host.pref_set(KEY_API_KEY, &self.api_key);
        host.pref_set(KEY_MODEL, &self.model);
    }
}

/// Split a user-provided domain list on commas, semicolons, or whitespace.
pub fn split_domain_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::CapturedExchange;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct PrefsHost {
        prefs: Mutex<HashMap<String, String>>,
    }

    impl ProxyHost for PrefsHost {
        fn is_in_scope(&self, _url: &str) -> bool {
            true
        }
        fn history(&self) -> Vec<CapturedExchange> {
            Vec::new()
        }
        fn pref_get(&self, key: &str) -> Option<String> {
            self.prefs.lock().get(key).cloned()
        }
        fn pref_set(&self, key: &str, value: &str) {
            self.prefs.lock().insert(key.to_string(), value.to_string());
        }
        fn persist(&self, _key: &str, _value: &str) {}
        fn load(&self, _key: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn defaults_when_prefs_empty() {
        let host = PrefsHost::default();
        let config = CoreConfig::from_host(&host);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.queries_per_minute, 10);
        assert_eq!(config.ai_provider, "OpenAI");
        assert_eq!(config.model, "gpt-4");
        assert!(!config.auto_process);
        assert_eq!(config.domain_filter_mode, DomainFilterMode::All);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let host = PrefsHost::default();
        host.pref_set(KEY_WORKER_THREADS, "99");
        host.pref_set(KEY_QUERIES_PER_MINUTE, "0");
        let config = CoreConfig::from_host(&host);
        assert_eq!(config.worker_threads, 10);
        assert_eq!(config.queries_per_minute, 1);
    }

    #[test]
    fn save_load_roundtrip() {
        let host = PrefsHost::default();
        let mut config = CoreConfig::default();
        config.auto_process = true;
        config.worker_threads = 5;
        config.domain_filter_mode = DomainFilterMode::CustomList;
        config.domain_filter_domains = vec!["example.com".into(), "shop.example.org".into()];
        config.save(&host);

        let loaded = CoreConfig::from_host(&host);
        assert!(loaded.auto_process);
        assert_eq!(loaded.worker_threads, 5);
        assert_eq!(loaded.domain_filter_mode, DomainFilterMode::CustomList);
        assert_eq!(loaded.domain_filter_domains, config.domain_filter_domains);
    }

    #[test]
    fn domain_list_splits_on_all_separators() {
        assert_eq!(
            split_domain_list("a.com, b.org;c.net  d.io"),
            vec!["a.com", "b.org", "c.net", "d.io"]
        );
        assert!(split_domain_list("  ").is_empty());
    }
}
