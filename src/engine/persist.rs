// ── Cookielens Engine: Verdict Persistence ─────────────────────────────────
// Flattens one verdict into the host's per-project key/value store so the
// results table survives a host restart. Replays are deliberately not
// persisted — only the derived per-cookie rows.
//
// Layout: `cookieAnalysis.resultCount = N`, then for i in [0, N):
// `cookieAnalysis.result.i.{cookieName,status,required,responseCode,details}`.

use crate::atoms::traits::ProxyHost;
use crate::atoms::types::Verdict;

const KEY_COUNT: &str = "cookieAnalysis.resultCount";
const KEY_PREFIX: &str = "cookieAnalysis.result";

const STATUS_REQUIRED: &str = "REQUIRED";
const STATUS_OPTIONAL: &str = "OPTIONAL";
const STATUS_UNKNOWN: &str = "UNKNOWN";

/// One flattened per-cookie row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedResult {
    pub cookie_name: String,
    pub status: String,
    pub required: bool,
    pub response_code: String,
    pub details: String,
}

fn result_key(index: usize, field: &str) -> String {
    format!("{}.{}.{}", KEY_PREFIX, index, field)
}

/// Status code observed when this cookie was removed, falling back to the
/// baseline's.
fn response_code_for(verdict: &Verdict, cookie_name: &str) -> String {
    let removal_label = format!("WITHOUT:{}", cookie_name);
    verdict
        .replays
        .iter()
        .find(|replay| replay.label == removal_label)
        .and_then(|replay| replay.outcome.status())
        .or_else(|| verdict.baseline.as_ref().and_then(|b| b.status()))
        .map(|status| status.to_string())
        .unwrap_or_default()
}

/// Write every per-cookie row of `verdict`, replacing whatever was stored.
pub fn persist_verdict(host: &dyn ProxyHost, verdict: &Verdict) {
    let rows: Vec<(String, &str)> = verdict
        .required
        .iter()
        .map(|c| (c.name.clone(), STATUS_REQUIRED))
        .chain(verdict.optional.iter().map(|c| (c.name.clone(), STATUS_OPTIONAL)))
        .chain(verdict.unknown.iter().map(|c| (c.name.clone(), STATUS_UNKNOWN)))
        .collect();

    host.persist(KEY_COUNT, &rows.len().to_string());
    for (index, (name, status)) in rows.iter().enumerate() {
        host.persist(&result_key(index, "cookieName"), name);
        host.persist(&result_key(index, "status"), status);
        host.persist(
            &result_key(index, "required"),
            if *status == STATUS_REQUIRED { "true" } else { "false" },
        );
        host.persist(&result_key(index, "responseCode"), &response_code_for(verdict, name));
        host.persist(
            &result_key(index, "details"),
            verdict.details.get(name.as_str()).map(String::as_str).unwrap_or(""),
        );
    }
}

/// Read back whatever rows a previous session stored. Rows with missing
/// fields are tolerated; a missing count means no stored results.
pub fn load_results(host: &dyn ProxyHost) -> Vec<PersistedResult> {
    let count: usize = host
        .load(KEY_COUNT)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0);

    (0..count)
        .filter_map(|index| {
            let cookie_name = host.load(&result_key(index, "cookieName"))?;
            Some(PersistedResult {
                cookie_name,
                status: host
                    .load(&result_key(index, "status"))
                    .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
                required: host
                    .load(&result_key(index, "required"))
                    .map(|value| value == "true")
                    .unwrap_or(false),
                response_code: host.load(&result_key(index, "responseCode")).unwrap_or_default(),
                details: host.load(&result_key(index, "details")).unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::CapturedExchange;
    use crate::atoms::types::{Cookie, LabeledReplay, ReplayOutcome, RequestTemplate};
    use crate::engine::replay::digest;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Default)]
    struct KvHost {
        kv: Mutex<HashMap<String, String>>,
    }

    impl ProxyHost for KvHost {
        fn is_in_scope(&self, _: &str) -> bool {
            true
        }
        fn history(&self) -> Vec<CapturedExchange> {
            Vec::new()
        }
        fn pref_get(&self, _: &str) -> Option<String> {
            None
        }
        fn pref_set(&self, _: &str, _: &str) {}
        fn persist(&self, key: &str, value: &str) {
            self.kv.lock().insert(key.to_string(), value.to_string());
        }
        fn load(&self, key: &str) -> Option<String> {
            self.kv.lock().get(key).cloned()
        }
    }

    fn sample_verdict() -> Verdict {
        let request = RequestTemplate {
            method: "GET".into(),
            url: "https://app.example.com/".into(),
            headers: vec![],
            body: vec![],
        };
        let baseline =
            ReplayOutcome::Completed { status: 200, body_len: 10, digest: digest(b"0123456789") };
        let mut details = BTreeMap::new();
        details.insert("sid".to_string(), "Removing this cookie changed the response".to_string());
        details.insert("_ga".to_string(), "Response unchanged without this cookie".to_string());
        Verdict {
            required: vec![Cookie::new("sid", "1")],
            optional: vec![Cookie::new("_ga", "2")],
            unknown: vec![],
            alternatives: BTreeMap::new(),
            details,
            requests_sent: 4,
            baseline: Some(baseline),
            replays: vec![LabeledReplay {
                label: "WITHOUT:sid".into(),
                request,
                outcome: ReplayOutcome::Completed {
                    status: 401,
                    body_len: 4,
                    digest: digest(b"deny"),
                },
            }],
            reliable: true,
        }
    }

    #[test]
    fn persist_then_load_roundtrips() {
        let host = KvHost::default();
        persist_verdict(&host, &sample_verdict());

        let rows = load_results(&host);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cookie_name, "sid");
        assert_eq!(rows[0].status, "REQUIRED");
        assert!(rows[0].required);
        assert_eq!(rows[0].response_code, "401"); // status seen when removed
        assert!(rows[0].details.contains("changed the response"));
        assert_eq!(rows[1].cookie_name, "_ga");
        assert_eq!(rows[1].status, "OPTIONAL");
        assert!(!rows[1].required);
        assert_eq!(rows[1].response_code, "200"); // baseline fallback
    }

    #[test]
    fn missing_count_means_no_rows() {
        let host = KvHost::default();
        assert!(load_results(&host).is_empty());
    }

    #[test]
    fn unknown_cookies_persist_as_unknown() {
        let host = KvHost::default();
        let mut verdict = sample_verdict();
        verdict.required.clear();
        verdict.optional.clear();
        verdict.baseline = None;
        verdict.replays.clear();
        verdict.unknown = vec![Cookie::new("sid", "1")];
        persist_verdict(&host, &verdict);

        let rows = load_results(&host);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "UNKNOWN");
        assert!(!rows[0].required);
        assert_eq!(rows[0].response_code, "");
    }
}
