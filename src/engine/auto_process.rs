// ── Cookielens Engine: Passive Auto-Processor ──────────────────────────────
//
// Feeds the classifier from live traffic. The host proxy invokes
// `on_request` / `on_response` on its hot path, so both return immediately:
// header values are cloned and all parsing + submission happens on a
// spawned task. Queue submission itself never blocks either.
//
// Cookie names come from exactly two places:
//   outbound — the request's `Cookie` header;
//   inbound  — `Set-Cookie` response headers (never the body).
// A name containing a space or semicolon is garbage and is dropped, which
// also keeps folded header continuations from minting bogus names.

use log::info;
use std::sync::Arc;

use crate::atoms::classify_types::{ClassifyTask, TaskPriority};
use crate::atoms::traits::{CapturedResponse, ProxyHost};
use crate::atoms::types::RequestTemplate;
use crate::engine::classifier::ClassifierPipeline;
use crate::engine::config::DomainFilterMode;

// ── Domain filter ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DomainFilter {
    mode: DomainFilterMode,
    domains: Vec<String>,
}

impl DomainFilter {
    pub fn new(mode: DomainFilterMode, domains: Vec<String>) -> Self {
        DomainFilter { mode, domains }
    }

    /// Whether traffic for `url` (with host `domain`) may feed the
    /// classifier.
    pub fn allows(&self, host: &dyn ProxyHost, url: &str, domain: &str) -> bool {
        match self.mode {
            DomainFilterMode::All => true,
            DomainFilterMode::InScope => host.is_in_scope(url),
            DomainFilterMode::CustomList => {
                self.domains.iter().any(|entry| domain_matches(entry, domain))
            }
        }
    }
}

/// Exact match, or suffix match in either direction: the entry
/// `example.com` covers `shop.example.com`, and the entry
/// `shop.example.com` covers `example.com`.
fn domain_matches(entry: &str, domain: &str) -> bool {
    if entry.eq_ignore_ascii_case(domain) {
        return true;
    }
    let entry = entry.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    domain.ends_with(&format!(".{}", entry)) || entry.ends_with(&format!(".{}", domain))
}

// ── Header parsing ─────────────────────────────────────────────────────────

fn acceptable_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(' ') && !name.contains(';')
}

/// Cookie names carried by one `Cookie` header value, in order.
pub fn names_from_cookie_header(value: &str) -> Vec<String> {
    value
        .split(';')
        .filter_map(|pair| {
            let name = match pair.split_once('=') {
                Some((name, _)) => name.trim(),
                None => pair.trim(),
            };
            acceptable_name(name).then(|| name.to_string())
        })
        .collect()
}

/// The cookie name set by one `Set-Cookie` header value, if it is sane.
pub fn name_from_set_cookie(value: &str) -> Option<String> {
    let first_attr = value.split(';').next()?;
    let name = match first_attr.split_once('=') {
        Some((name, _)) => name.trim(),
        None => first_attr.trim(),
    };
    acceptable_name(name).then(|| name.to_string())
}

// ── Auto-processor ─────────────────────────────────────────────────────────

pub struct AutoProcessor {
    pipeline: Arc<ClassifierPipeline>,
    host: Arc<dyn ProxyHost>,
    filter: DomainFilter,
    enabled: bool,
}

impl AutoProcessor {
    pub fn new(
        pipeline: Arc<ClassifierPipeline>,
        host: Arc<dyn ProxyHost>,
        filter: DomainFilter,
        enabled: bool,
    ) -> Self {
        AutoProcessor { pipeline, host, filter, enabled }
    }

    /// Host callback: a request is about to be sent. Returns immediately.
    pub fn on_request(&self, request: &RequestTemplate) {
        if !self.enabled {
            return;
        }
        let url = request.url.clone();
        let header = request.header("Cookie").map(|v| v.to_string());
        let domain = request.host().unwrap_or_default();
        let pipeline = self.pipeline.clone();
        let host = self.host.clone();
        let filter = self.filter.clone();
        tokio::spawn(async move {
            let Some(header) = header else { return };
            if !filter.allows(host.as_ref(), &url, &domain) {
                return;
            }
            for name in names_from_cookie_header(&header) {
                pipeline.submit(ClassifyTask::new(name, domain.clone(), TaskPriority::Auto));
            }
        });
    }

    /// Host callback: a response was received. Returns immediately.
    pub fn on_response(&self, request: &RequestTemplate, response: &CapturedResponse) {
        if !self.enabled {
            return;
        }
        let url = request.url.clone();
        let domain = request.host().unwrap_or_default();
        let set_cookies: Vec<String> = response
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, value)| value.clone())
            .collect();
        let pipeline = self.pipeline.clone();
        let host = self.host.clone();
        let filter = self.filter.clone();
        tokio::spawn(async move {
            if set_cookies.is_empty() || !filter.allows(host.as_ref(), &url, &domain) {
                return;
            }
            for value in &set_cookies {
                if let Some(name) = name_from_set_cookie(value) {
                    pipeline.submit(ClassifyTask::new(name, domain.clone(), TaskPriority::Auto));
                }
            }
        });
    }

    /// Bulk operation: scan the host's traffic history and enqueue every
    /// cookie name seen, with manual priority. `force_refresh` makes the
    /// workers re-ask the LM even for cached names.
    pub fn replay_history(&self, force_refresh: bool) {
        let exchanges = self.host.history();
        info!("[auto] replaying {} history entries", exchanges.len());
        let mut submitted = 0usize;
        for exchange in exchanges {
            let domain = exchange.request.host().unwrap_or_default();
            if !self.filter.allows(self.host.as_ref(), &exchange.request.url, &domain) {
                continue;
            }
            if let Some(header) = exchange.request.header("Cookie") {
                for name in names_from_cookie_header(header) {
                    self.pipeline.submit(
                        ClassifyTask::new(name, domain.clone(), TaskPriority::Manual)
                            .with_force_refresh(force_refresh),
                    );
                    submitted += 1;
                }
            }
            if let Some(response) = &exchange.response {
                for (header_name, value) in &response.headers {
                    if !header_name.eq_ignore_ascii_case("set-cookie") {
                        continue;
                    }
                    if let Some(name) = name_from_set_cookie(value) {
                        self.pipeline.submit(
                            ClassifyTask::new(name, domain.clone(), TaskPriority::Manual)
                                .with_force_refresh(force_refresh),
                        );
                        submitted += 1;
                    }
                }
            }
        }
        info!("[auto] history replay submitted {} tasks", submitted);
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::CapturedExchange;
    use crate::engine::store::CookieStore;
    use async_trait::async_trait;
    use crate::atoms::traits::{AiProvider, ClassifyReply, ProviderError};

    struct NullProvider;

    #[async_trait]
    impl AiProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn classify(&self, name: &str, _: &str) -> Result<ClassifyReply, ProviderError> {
            Ok(ClassifyReply {
                descriptor: crate::atoms::classify_types::Descriptor::unknown(name),
                raw_response: "{}".into(),
            })
        }
        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec![])
        }
    }

    struct ScopedHost {
        in_scope_suffix: String,
        exchanges: Vec<CapturedExchange>,
    }

    impl ProxyHost for ScopedHost {
        fn is_in_scope(&self, url: &str) -> bool {
            url.contains(&self.in_scope_suffix)
        }
        fn history(&self) -> Vec<CapturedExchange> {
            self.exchanges.clone()
        }
        fn pref_get(&self, _: &str) -> Option<String> {
            None
        }
        fn pref_set(&self, _: &str, _: &str) {}
        fn persist(&self, _: &str, _: &str) {}
        fn load(&self, _: &str) -> Option<String> {
            None
        }
    }

    fn request(url: &str, cookie_header: Option<&str>) -> RequestTemplate {
        let mut headers = Vec::new();
        if let Some(value) = cookie_header {
            headers.push(("Cookie".to_string(), value.to_string()));
        }
        RequestTemplate { method: "GET".into(), url: url.into(), headers, body: vec![] }
    }

    fn pipeline() -> Arc<ClassifierPipeline> {
        Arc::new(ClassifierPipeline::new(
            Arc::new(CookieStore::open_in_memory().unwrap()),
            Arc::new(NullProvider),
            1,
            60,
        ))
    }

    // ── Parsing ────────────────────────────────────────────────────────────

    #[test]
    fn cookie_header_names() {
        assert_eq!(names_from_cookie_header("sid=1; _ga=2;theme=dark"), vec!["sid", "_ga", "theme"]);
        assert_eq!(names_from_cookie_header(""), Vec::<String>::new());
    }

    #[test]
    fn set_cookie_names() {
        assert_eq!(
            name_from_set_cookie("sid=abc123; Path=/; HttpOnly; Secure").as_deref(),
            Some("sid")
        );
        assert_eq!(name_from_set_cookie("flag=; Max-Age=0").as_deref(), Some("flag"));
        // Garbage and folded continuations produce nothing.
        assert_eq!(name_from_set_cookie("bad name=1"), None);
        assert_eq!(name_from_set_cookie("   "), None);
    }

    #[test]
    fn domain_suffix_matching_is_bidirectional() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches("example.com", "shop.example.com"));
        assert!(domain_matches("shop.example.com", "example.com"));
        assert!(domain_matches("Example.COM", "shop.example.com"));
        assert!(!domain_matches("example.com", "example.org"));
        assert!(!domain_matches("ample.com", "example.com"));
    }

    // ── Filtering & submission ─────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn out_of_scope_requests_submit_nothing() {
        let pipeline = pipeline();
        let host = Arc::new(ScopedHost {
            in_scope_suffix: "app.example.com".into(),
            exchanges: vec![],
        });
        let processor = AutoProcessor::new(
            pipeline.clone(),
            host,
            DomainFilter::new(DomainFilterMode::InScope, vec![]),
            true,
        );

        processor.on_request(&request("https://other.org/page", Some("sid=1")));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(pipeline.statistics().queue_size + pipeline.statistics().processed, 0);

        processor.on_request(&request("https://app.example.com/page", Some("sid=1")));
        tokio::time::timeout(std::time::Duration::from_secs(60), async {
            while pipeline.statistics().processed < 1 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pipeline.statistics().processed, 1);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_processor_is_inert() {
        let pipeline = pipeline();
        let host =
            Arc::new(ScopedHost { in_scope_suffix: String::new(), exchanges: vec![] });
        let processor = AutoProcessor::new(
            pipeline.clone(),
            host,
            DomainFilter::new(DomainFilterMode::All, vec![]),
            false,
        );
        processor.on_request(&request("https://a.example/", Some("sid=1")));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(pipeline.statistics().processed + pipeline.statistics().queue_size, 0);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn response_side_reads_set_cookie_only() {
        let pipeline = pipeline();
        let host =
            Arc::new(ScopedHost { in_scope_suffix: String::new(), exchanges: vec![] });
        let processor = AutoProcessor::new(
            pipeline.clone(),
            host,
            DomainFilter::new(DomainFilterMode::All, vec![]),
            true,
        );

        let response = CapturedResponse {
            status: 200,
            headers: vec![
                ("Content-Type".into(), "text/html".into()),
                ("Set-Cookie".into(), "sid=abc; HttpOnly".into()),
                ("set-cookie".into(), "_ga=GA1.2; Path=/".into()),
            ],
            body: b"<html>sid everywhere</html>".to_vec(),
        };
        processor.on_response(&request("https://app.example.com/", None), &response);
        // Both names drain through the single worker.
        tokio::time::timeout(std::time::Duration::from_secs(60), async {
            while pipeline.statistics().processed < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pipeline.statistics().processed, 2);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn history_replay_submits_manual_tasks() {
        let pipeline = pipeline();
        let exchanges = vec![CapturedExchange {
            request: request("https://app.example.com/login", Some("sid=1; theme=dark")),
            response: Some(CapturedResponse {
                status: 200,
                headers: vec![("Set-Cookie".into(), "csrf=tok; Path=/".into())],
                body: b"ok".to_vec(),
            }),
        }];
        let host = Arc::new(ScopedHost { in_scope_suffix: String::new(), exchanges });
        let processor = AutoProcessor::new(
            pipeline.clone(),
            host,
            DomainFilter::new(DomainFilterMode::All, vec![]),
            true,
        );

        processor.replay_history(false);
        tokio::time::timeout(std::time::Duration::from_secs(60), async {
            while pipeline.statistics().processed < 3 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pipeline.statistics().processed, 3);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn custom_list_filter_gates_by_domain() {
        let pipeline = pipeline();
        let host =
            Arc::new(ScopedHost { in_scope_suffix: String::new(), exchanges: vec![] });
        let processor = AutoProcessor::new(
            pipeline.clone(),
            host,
            DomainFilter::new(DomainFilterMode::CustomList, vec!["example.com".into()]),
            true,
        );

        processor.on_request(&request("https://shop.example.com/", Some("sid=1")));
        processor.on_request(&request("https://tracker.ads.net/", Some("_track=9")));
        tokio::time::timeout(std::time::Duration::from_secs(60), async {
            while pipeline.statistics().processed < 1 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // Only the allow-listed domain's cookie got through.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        assert_eq!(pipeline.statistics().processed, 1);
        pipeline.shutdown().await;
    }
}
