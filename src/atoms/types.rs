// ── Cookielens Atoms: Pure Data Types ──────────────────────────────────────
// HTTP template, cookie snapshot, replay outcome, and verdict types.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Cookies ────────────────────────────────────────────────────────────────

/// Detached name + value snapshot of one request cookie.
///
/// Within one analysis, cookies are identified by their position in the
/// input sequence, not by name — two cookies may share a name and still be
/// distinct. The value is carried so a modified request can be rebuilt; it
/// is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie { name: name.into(), value: value.into() }
    }
}

// ── Request template ───────────────────────────────────────────────────────

/// The captured request all perturbed variants are derived from.
///
/// Header order is preserved; repeated header names are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl RequestTemplate {
    /// Derive a request carrying exactly the given cookies.
    ///
    /// Every existing `Cookie` header is stripped; when `cookies` is
    /// non-empty a single replacement header is written at the position of
    /// the first original one (or appended if the original had none).
    /// Method, URL, body, and all other headers are untouched.
    pub fn with_cookies(&self, cookies: &[Cookie]) -> RequestTemplate {
        let mut derived = self.clone();
        let first_at = derived
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case("cookie"));
        derived.headers.retain(|(n, _)| !n.eq_ignore_ascii_case("cookie"));

        if !cookies.is_empty() {
            let joined = cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            let at = first_at.unwrap_or(derived.headers.len()).min(derived.headers.len());
            derived.headers.insert(at, ("Cookie".to_string(), joined));
        }
        derived
    }

    /// The cookies carried by this request's `Cookie` header(s), in order.
    pub fn cookies(&self) -> Vec<Cookie> {
        let mut out = Vec::new();
        for (name, value) in &self.headers {
            if !name.eq_ignore_ascii_case("cookie") {
                continue;
            }
            for pair in value.split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((n, v)) => out.push(Cookie::new(n.trim(), v)),
                    None => out.push(Cookie::new(pair, "")),
                }
            }
        }
        out
    }

    /// Host component of the request URL, lowercased. `None` when the URL
    /// does not parse.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ── Replay outcome ─────────────────────────────────────────────────────────

/// What one upstream replay produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayOutcome {
    /// The upstream answered: status, body length, and SHA-256 body digest.
    Completed { status: u16, body_len: usize, digest: [u8; 32] },
    /// Nothing usable came back (network error, empty body, timeout).
    Failed { reason: String },
}

impl ReplayOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReplayOutcome::Failed { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ReplayOutcome::Completed { status, .. } => Some(*status),
            ReplayOutcome::Failed { .. } => None,
        }
    }

    /// Compact description for detail strings and logs.
    pub fn describe(&self) -> String {
        match self {
            ReplayOutcome::Completed { status, body_len, .. } => {
                format!("status {} ({} bytes)", status, body_len)
            }
            ReplayOutcome::Failed { reason } => format!("failed: {}", reason),
        }
    }
}

// ── Replay log ─────────────────────────────────────────────────────────────

/// One replay captured for UI playback, under a stable label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledReplay {
    pub label: String,
    pub request: RequestTemplate,
    pub outcome: ReplayOutcome,
}

// ── Verdict ────────────────────────────────────────────────────────────────

/// Result of one cookie-requirement analysis.
///
/// `required` and `optional` partition the input cookie set and preserve
/// input order. On a failed analysis both are empty and every input cookie
/// lands in `unknown` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Minimal cookie set: removing any single member breaks equivalence.
    pub required: Vec<Cookie>,
    /// Input cookies not needed for an equivalent response.
    pub optional: Vec<Cookie>,
    /// Cookies that could not be assessed (baseline failure, cancellation).
    pub unknown: Vec<Cookie>,
    /// For each required cookie name, cookies that substitute for it.
    pub alternatives: BTreeMap<String, Vec<Cookie>>,
    /// Human-readable rationale per cookie name.
    pub details: BTreeMap<String, String>,
    /// Upstream requests issued during the run, failures included.
    pub requests_sent: u32,
    /// The reference outcome; absent when the baseline itself failed.
    pub baseline: Option<ReplayOutcome>,
    /// Replay log for UI playback.
    pub replays: Vec<LabeledReplay>,
    /// Cleared when the minimal-set re-check failed twice. The verdict is
    /// still returned; the most probable cause is upstream flakiness.
    pub reliable: bool,
}

impl Verdict {
    pub fn failed(&self) -> bool {
        self.baseline.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_with_headers(headers: Vec<(&str, &str)>) -> RequestTemplate {
        RequestTemplate {
            method: "GET".into(),
            url: "https://app.example.com/account".into(),
            headers: headers
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn with_cookies_replaces_header_in_place() {
        let template = template_with_headers(vec![
            ("Host", "app.example.com"),
            ("Cookie", "sid=1; _ga=2"),
            ("Accept", "*/*"),
        ]);
        let derived = template.with_cookies(&[Cookie::new("sid", "1")]);
        assert_eq!(derived.headers[1], ("Cookie".to_string(), "sid=1".to_string()));
        assert_eq!(derived.headers.len(), 3);
        // Source template untouched
        assert_eq!(template.headers[1].1, "sid=1; _ga=2");
    }

    #[test]
    fn with_cookies_empty_set_strips_header() {
        let template = template_with_headers(vec![("Cookie", "sid=1")]);
        let derived = template.with_cookies(&[]);
        assert!(derived.headers.is_empty());
    }

    #[test]
    fn with_cookies_merges_repeated_headers() {
        let template = template_with_headers(vec![
            ("Cookie", "a=1"),
            ("Host", "app.example.com"),
            ("cookie", "b=2"),
        ]);
        let derived = template.with_cookies(&[Cookie::new("a", "1"), Cookie::new("b", "2")]);
        assert_eq!(derived.headers.len(), 2);
        assert_eq!(derived.headers[0], ("Cookie".to_string(), "a=1; b=2".to_string()));
    }

    #[test]
    fn cookie_parsing_preserves_order_and_empty_values() {
        let template = template_with_headers(vec![("Cookie", "sid=abc; flag=; bare")]);
        let cookies = template.cookies();
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0], Cookie::new("sid", "abc"));
        assert_eq!(cookies[1], Cookie::new("flag", ""));
        assert_eq!(cookies[2], Cookie::new("bare", ""));
    }

    #[test]
    fn host_extraction() {
        let template = template_with_headers(vec![]);
        assert_eq!(template.host().as_deref(), Some("app.example.com"));
    }
}
