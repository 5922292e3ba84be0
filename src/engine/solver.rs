// ── Cookielens Engine: Minimal-Cookie-Set Solver ───────────────────────────
//
// Determines, by replaying perturbed variants of a captured request, which
// subset of its cookies the upstream actually needs, and which cookies can
// substitute for a needed one.
//
// Phase flow for one analysis:
//
//   Baseline → Individual → Verify → (Search)? → Minimize
//            → SmartVerify → Alternatives → Confirm
//
// A failed baseline is the only fatal condition; every later phase has a
// defined fallback. The solver is sequential: replays are issued one at a
// time, in a fixed order, so a deterministic upstream yields a
// deterministic verdict.
//
// Request economy: a replay of a set already proven equivalent is never
// repeated — the verification phases reuse the standing proof instead of
// issuing a fresh request.

use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::atoms::constants::{
    BODY_LEN_TOLERANCE, LABEL_BASELINE, LABEL_MINIMAL_SET, LABEL_MINIMIZE_PREFIX,
    LABEL_RECHECK_SUFFIX, LABEL_SEARCH_PREFIX, LABEL_SUSPICIOUS_ONLY, LABEL_VERIFY_MINIMAL,
    LABEL_VERIFY_RETRY, LABEL_WITHOUT_PREFIX, RECHECK_PAUSE, VERIFY_RETRY_PAUSE,
};
use crate::atoms::traits::ReplayTransport;
use crate::atoms::types::{Cookie, LabeledReplay, ReplayOutcome, RequestTemplate, Verdict};
use crate::engine::replay::Replayer;

/// Details key for notes about the run itself rather than one cookie.
pub const DETAIL_KEY_ANALYSIS: &str = "(analysis)";

// ── Equivalence ────────────────────────────────────────────────────────────

/// Whether `outcome` is equivalent to the baseline: same status, and either
/// an identical body digest or a body length within `tolerance` of the
/// baseline's. A failed outcome is never equivalent.
pub(crate) fn outcomes_equivalent(
    baseline: &ReplayOutcome,
    outcome: &ReplayOutcome,
    tolerance: f64,
) -> bool {
    match (baseline, outcome) {
        (
            ReplayOutcome::Completed { status: base_status, body_len: base_len, digest: base_digest },
            ReplayOutcome::Completed { status, body_len, digest },
        ) => {
            if status != base_status {
                return false;
            }
            if digest == base_digest {
                return true;
            }
            let delta = (*body_len as f64 - *base_len as f64).abs();
            delta / (*base_len).max(1) as f64 <= tolerance
        }
        _ => false,
    }
}

// ── Options & cancellation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Body-length slack accepted by the equivalence check. Fixed for the
    /// lifetime of one solver; never varied within a run.
    pub body_tolerance: f64,
    /// Re-test a cookie once before believing its removal mattered.
    /// Mitigates WAF blips and rate-limit noise on production targets.
    pub double_check: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions { body_tolerance: BODY_LEN_TOLERANCE, double_check: true }
    }
}

/// Cooperative cancel token, checked between phases. Cancelling never
/// interrupts an in-flight replay.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ── Solver ─────────────────────────────────────────────────────────────────

pub struct Solver {
    replayer: Replayer,
    options: SolverOptions,
    cancel: CancelHandle,
}

impl Solver {
    pub fn new(transport: Arc<dyn ReplayTransport>) -> Self {
        Solver::with_options(transport, SolverOptions::default())
    }

    pub fn with_options(transport: Arc<dyn ReplayTransport>, options: SolverOptions) -> Self {
        Solver { replayer: Replayer::new(transport), options, cancel: CancelHandle::default() }
    }

    /// Token for cancelling a running `analyze` from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Analyze which of `cookies` the upstream needs for `template`'s
    /// response to stay equivalent to the unperturbed original.
    ///
    /// Never fails: upstream trouble is folded into the verdict (`details`
    /// entries, the `reliable` flag, or a baseline-failure verdict with
    /// every cookie unknown).
    pub async fn analyze(&self, template: &RequestTemplate, cookies: &[Cookie]) -> Verdict {
        info!("[solver] analyzing {} with {} cookies", template.url, cookies.len());
        let mut run = Analysis::new(&self.replayer, &self.options, template, cookies);

        // Phase 1 — baseline anchor.
        if !run.baseline().await {
            warn!("[solver] baseline failed for {}", template.url);
            return run.into_failed_verdict();
        }
        if cookies.is_empty() {
            return run.into_verdict(Vec::new());
        }
        if self.cancel.is_cancelled() {
            return run.into_cancelled_verdict("baseline");
        }

        // Phase 2 — individual perturbation.
        run.individual().await;
        if self.cancel.is_cancelled() {
            return run.into_cancelled_verdict("individual");
        }

        let required = if run.suspicious.is_empty() {
            // Every cookie was individually removable.
            Vec::new()
        } else {
            // Phase 3 — do the suspicious cookies alone reproduce the baseline?
            let working = if run.verify_suspicious().await {
                run.suspicious.clone()
            } else {
                // Phase 4 — coupling with individually-cleared cookies.
                run.search().await
            };
            if self.cancel.is_cancelled() {
                return run.into_cancelled_verdict("verify");
            }

            // Phase 5 — greedy contraction to a locally minimal set.
            let required = run.minimize(working).await;
            if self.cancel.is_cancelled() {
                return run.into_cancelled_verdict("minimize");
            }

            // Phase 6 — re-check the contracted set.
            run.smart_verify(&required).await;

            // Phase 7 — substitution probes.
            run.alternatives(&required).await;
            required
        };

        // Phase 8 — final confirmation for the record.
        run.confirm(&required).await;

        info!(
            "[solver] done: {} required / {} input, {} requests",
            required.len(),
            cookies.len(),
            run.requests_sent
        );
        run.into_verdict(required)
    }
}

// ── One analysis run ───────────────────────────────────────────────────────

struct Analysis<'a> {
    replayer: &'a Replayer,
    options: &'a SolverOptions,
    template: &'a RequestTemplate,
    cookies: &'a [Cookie],
    baseline: Option<ReplayOutcome>,
    requests_sent: u32,
    replays: Vec<LabeledReplay>,
    details: BTreeMap<String, String>,
    alternatives: BTreeMap<String, Vec<Cookie>>,
    /// Indices cleared by individual perturbation, in input order.
    optional: Vec<usize>,
    /// Indices whose individual removal disturbed the response.
    suspicious: Vec<usize>,
    /// Whether the working set had to be widened beyond `suspicious`.
    searched: bool,
    reliable: bool,
    /// Most recent cookie set whose replay matched the baseline, with that
    /// outcome. Lets the verification phases skip redundant requests.
    proven: Option<(Vec<usize>, ReplayOutcome)>,
}

impl<'a> Analysis<'a> {
    fn new(
        replayer: &'a Replayer,
        options: &'a SolverOptions,
        template: &'a RequestTemplate,
        cookies: &'a [Cookie],
    ) -> Self {
        Analysis {
            replayer,
            options,
            template,
            cookies,
            baseline: None,
            requests_sent: 0,
            replays: Vec::new(),
            details: BTreeMap::new(),
            alternatives: BTreeMap::new(),
            optional: Vec::new(),
            suspicious: Vec::new(),
            searched: false,
            reliable: true,
            proven: None,
        }
    }

    fn name(&self, idx: usize) -> &str {
        &self.cookies[idx].name
    }

    fn subset(&self, indices: &[usize]) -> Vec<Cookie> {
        indices.iter().map(|&i| self.cookies[i].clone()).collect()
    }

    fn equivalent(&self, outcome: &ReplayOutcome) -> bool {
        match &self.baseline {
            Some(baseline) => outcomes_equivalent(baseline, outcome, self.options.body_tolerance),
            None => false,
        }
    }

    fn mark_proven(&mut self, mut indices: Vec<usize>, outcome: ReplayOutcome) {
        indices.sort_unstable();
        self.proven = Some((indices, outcome));
    }

    fn proof_for(&self, indices: &[usize]) -> Option<&ReplayOutcome> {
        match &self.proven {
            Some((set, outcome)) if set.as_slice() == indices => Some(outcome),
            _ => None,
        }
    }

    /// Replay the template carrying exactly the cookies at `indices`.
    async fn send_subset(&mut self, label: &str, indices: &[usize]) -> ReplayOutcome {
        let request = self.template.with_cookies(&self.subset(indices));
        let outcome = self.replayer.replay(&request).await;
        self.requests_sent += 1;
        self.replays.push(LabeledReplay {
            label: label.to_string(),
            request,
            outcome: outcome.clone(),
        });
        outcome
    }

    // ── Phase 1 ────────────────────────────────────────────────────────────

    async fn baseline(&mut self) -> bool {
        let outcome = self.replayer.replay(self.template).await;
        self.requests_sent += 1;
        self.replays.push(LabeledReplay {
            label: LABEL_BASELINE.to_string(),
            request: self.template.clone(),
            outcome: outcome.clone(),
        });
        match &outcome {
            ReplayOutcome::Completed { status, .. } if *status != 0 => {
                self.baseline = Some(outcome);
                true
            }
            _ => false,
        }
    }

    // ── Phase 2 ────────────────────────────────────────────────────────────

    async fn individual(&mut self) {
        for idx in 0..self.cookies.len() {
            let name = self.name(idx).to_string();
            let without: Vec<usize> = (0..self.cookies.len()).filter(|&i| i != idx).collect();
            let label = format!("{}{}", LABEL_WITHOUT_PREFIX, name);
            let outcome = self.send_subset(&label, &without).await;
            let mut is_suspicious = !self.equivalent(&outcome);

            if is_suspicious && self.options.double_check {
                // The disturbance may be upstream noise, not the cookie.
                tokio::time::sleep(RECHECK_PAUSE).await;
                let recheck_label = format!("{}{}", label, LABEL_RECHECK_SUFFIX);
                let second = self.send_subset(&recheck_label, &without).await;
                if self.equivalent(&second) {
                    is_suspicious = false;
                    info!("[solver] recheck cleared {}", name);
                    self.details.insert(
                        name.clone(),
                        format!(
                            "Optional — first removal looked significant ({}), but an immediate \
                             recheck matched the baseline; treated as upstream noise",
                            outcome.describe()
                        ),
                    );
                }
            }

            if is_suspicious {
                self.suspicious.push(idx);
                let note = match &outcome {
                    ReplayOutcome::Failed { reason } => format!(
                        "Replay without this cookie failed ({}); treated as potentially required",
                        reason
                    ),
                    other => format!(
                        "Removing this cookie changed the response ({} vs baseline {})",
                        other.describe(),
                        self.baseline.as_ref().map(|b| b.describe()).unwrap_or_default()
                    ),
                };
                self.details.insert(name, note);
            } else {
                self.optional.push(idx);
                self.details
                    .entry(name)
                    .or_insert_with(|| "Response unchanged without this cookie".to_string());
            }
        }
        info!(
            "[solver] individual pass: {} suspicious, {} cleared",
            self.suspicious.len(),
            self.optional.len()
        );
    }

    // ── Phase 3 ────────────────────────────────────────────────────────────

    async fn verify_suspicious(&mut self) -> bool {
        let set = self.suspicious.clone();
        let outcome = self.send_subset(LABEL_SUSPICIOUS_ONLY, &set).await;
        if self.equivalent(&outcome) {
            self.mark_proven(set, outcome);
            true
        } else {
            info!("[solver] suspicious set alone is insufficient, widening");
            false
        }
    }

    // ── Phase 4 ────────────────────────────────────────────────────────────

    /// Binary-search the shortest prefix of the individually-cleared
    /// cookies that, together with the suspicious set, reproduces the
    /// baseline. The prefix order is the input order — a heuristic only;
    /// Minimize prunes whatever extra gets included.
    async fn search(&mut self) -> Vec<usize> {
        self.searched = true;
        let cleared = self.optional.clone();
        let mut lo = 0usize;
        let mut hi = cleared.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let mut set: Vec<usize> =
                self.suspicious.iter().chain(cleared[..mid].iter()).copied().collect();
            set.sort_unstable();
            let label = format!("{}{}", LABEL_SEARCH_PREFIX, mid);
            let outcome = self.send_subset(&label, &set).await;
            if self.equivalent(&outcome) {
                self.mark_proven(set, outcome);
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        if lo >= cleared.len() {
            // No proper prefix sufficed; fall back to the full input set,
            // which the baseline itself vouches for.
            warn!("[solver] no prefix reproduced the baseline, keeping full set");
            return (0..self.cookies.len()).collect();
        }
        let mut working: Vec<usize> =
            self.suspicious.iter().chain(cleared[..lo].iter()).copied().collect();
        working.sort_unstable();
        info!("[solver] search settled on {} cookies", working.len());
        working
    }

    // ── Phase 5 ────────────────────────────────────────────────────────────

    /// One greedy pass, input order: drop each member whose removal keeps
    /// the response equivalent. The result is locally minimal — removing
    /// any single survivor breaks equivalence — not necessarily a global
    /// minimum.
    async fn minimize(&mut self, working: Vec<usize>) -> Vec<usize> {
        let mut keep = working;
        for idx in keep.clone() {
            if keep.len() == 1 {
                // Smallest non-empty set; assumed required without a replay.
                break;
            }
            let candidate: Vec<usize> = keep.iter().copied().filter(|&i| i != idx).collect();
            let label = format!("{}{}", LABEL_MINIMIZE_PREFIX, self.name(idx));
            let outcome = self.send_subset(&label, &candidate).await;
            if self.equivalent(&outcome) {
                keep = candidate;
                self.mark_proven(keep.clone(), outcome);
            }
        }
        keep
    }

    // ── Phase 6 ────────────────────────────────────────────────────────────

    async fn smart_verify(&mut self, required: &[usize]) {
        if self.proof_for(required).is_some() {
            return;
        }
        let outcome = self.send_subset(LABEL_VERIFY_MINIMAL, required).await;
        if self.equivalent(&outcome) {
            self.mark_proven(required.to_vec(), outcome);
            return;
        }
        warn!("[solver] minimal-set verification mismatched, retrying once");
        tokio::time::sleep(VERIFY_RETRY_PAUSE).await;
        let second = self.send_subset(LABEL_VERIFY_RETRY, required).await;
        if self.equivalent(&second) {
            self.mark_proven(required.to_vec(), second);
            return;
        }
        self.reliable = false;
        self.details.insert(
            DETAIL_KEY_ANALYSIS.to_string(),
            format!(
                "Unreliable: the minimal set stopped matching the baseline during verification \
                 ({}); the result is kept, but the upstream looks unstable",
                second.describe()
            ),
        );
    }

    // ── Phase 7 ────────────────────────────────────────────────────────────

    async fn alternatives(&mut self, required: &[usize]) {
        // Individually-cleared cookies are normally poor substitutes — each
        // already proved the response survives without it. Once Search had
        // to widen the working set, that clearance no longer holds and they
        // rejoin the candidate pool.
        let pool: Vec<usize> = if self.searched {
            (0..self.cookies.len()).filter(|i| !required.contains(i)).collect()
        } else {
            self.suspicious.iter().copied().filter(|i| !required.contains(i)).collect()
        };
        if pool.is_empty() || required.is_empty() {
            return;
        }

        for &member in required {
            for &candidate in &pool {
                let mut set: Vec<usize> =
                    required.iter().copied().filter(|&i| i != member).collect();
                set.push(candidate);
                set.sort_unstable();
                let label = format!("ALT {} FOR {}", self.name(candidate), self.name(member));
                let outcome = self.send_subset(&label, &set).await;
                if self.equivalent(&outcome) {
                    let member_name = self.name(member).to_string();
                    let substitute = self.cookies[candidate].clone();
                    info!("[solver] {} can stand in for {}", substitute.name, member_name);
                    self.alternatives.entry(member_name).or_default().push(substitute);
                }
            }
        }
    }

    // ── Phase 8 ────────────────────────────────────────────────────────────

    async fn confirm(&mut self, required: &[usize]) {
        if self.cookies.is_empty() {
            return;
        }
        if let Some(outcome) = self.proof_for(required).cloned() {
            // Already demonstrated this exact set; record it for playback
            // without another upstream request.
            let request = self.template.with_cookies(&self.subset(required));
            self.replays.push(LabeledReplay {
                label: LABEL_MINIMAL_SET.to_string(),
                request,
                outcome,
            });
            self.note_analysis("Minimal set confirmed against baseline");
            return;
        }
        let outcome = self.send_subset(LABEL_MINIMAL_SET, required).await;
        if self.equivalent(&outcome) {
            self.note_analysis("Minimal set confirmed against baseline");
        } else {
            self.note_analysis(&format!(
                "Final minimal-set replay did not match the baseline ({})",
                outcome.describe()
            ));
        }
    }

    fn note_analysis(&mut self, note: &str) {
        self.details
            .entry(DETAIL_KEY_ANALYSIS.to_string())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(note);
            })
            .or_insert_with(|| note.to_string());
    }

    // ── Verdict assembly ───────────────────────────────────────────────────

    fn into_verdict(mut self, required_idx: Vec<usize>) -> Verdict {
        // Cookies pulled in by Search started out individually cleared;
        // their earlier note would misstate why they are required. Same for
        // suspicious cookies that Minimize pruned after all.
        let promoted: Vec<String> = required_idx
            .iter()
            .filter(|i| self.optional.contains(i))
            .map(|&i| self.cookies[i].name.clone())
            .collect();
        for name in promoted {
            self.details.insert(
                name,
                "Required in combination — removing it alone left the response equivalent, \
                 but the minimal set needs it"
                    .to_string(),
            );
        }
        let demoted: Vec<String> = self
            .suspicious
            .iter()
            .filter(|i| !required_idx.contains(i))
            .map(|&i| self.cookies[i].name.clone())
            .collect();
        for name in demoted {
            self.details.insert(
                name,
                "Optional — looked significant in isolation, but the minimal set works \
                 without it"
                    .to_string(),
            );
        }
        for (member_name, substitutes) in &self.alternatives {
            let names: Vec<&str> = substitutes.iter().map(|c| c.name.as_str()).collect();
            if let Some(note) = self.details.get_mut(member_name) {
                note.push_str(&format!("; interchangeable with: {}", names.join(", ")));
            }
        }

        let required: Vec<Cookie> = required_idx.iter().map(|&i| self.cookies[i].clone()).collect();
        let optional: Vec<Cookie> = (0..self.cookies.len())
            .filter(|i| !required_idx.contains(i))
            .map(|i| self.cookies[i].clone())
            .collect();

        Verdict {
            required,
            optional,
            unknown: Vec::new(),
            alternatives: self.alternatives,
            details: self.details,
            requests_sent: self.requests_sent,
            baseline: self.baseline,
            replays: self.replays,
            reliable: self.reliable,
        }
    }

    fn into_failed_verdict(mut self) -> Verdict {
        for cookie in self.cookies {
            self.details.insert(
                cookie.name.clone(),
                "Unknown — the baseline replay failed, so this cookie could not be assessed"
                    .to_string(),
            );
        }
        Verdict {
            required: Vec::new(),
            optional: Vec::new(),
            unknown: self.cookies.to_vec(),
            alternatives: BTreeMap::new(),
            details: self.details,
            requests_sent: self.requests_sent,
            baseline: None,
            replays: self.replays,
            reliable: self.reliable,
        }
    }

    fn into_cancelled_verdict(mut self, after_phase: &str) -> Verdict {
        self.note_analysis(&format!("Analysis cancelled after the {} phase", after_phase));
        Verdict {
            required: Vec::new(),
            optional: Vec::new(),
            unknown: self.cookies.to_vec(),
            alternatives: BTreeMap::new(),
            details: self.details,
            requests_sent: self.requests_sent,
            baseline: self.baseline,
            replays: self.replays,
            reliable: self.reliable,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::{TransportError, TransportResponse};
    use crate::engine::replay::digest;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const OK_BODY: &[u8] = b"<html>welcome back, account holder</html>";
    const DENIED_BODY: &[u8] = b"<html>authentication required</html>";

    /// Scripted upstream: a rule maps the cookie names present on each
    /// request (plus a 1-based call counter) to a canned response.
    struct ScriptedUpstream {
        calls: Mutex<u32>,
        rule: Box<dyn Fn(&[String], u32) -> Result<(u16, Vec<u8>), String> + Send + Sync>,
    }

    impl ScriptedUpstream {
        fn new(
            rule: impl Fn(&[String], u32) -> Result<(u16, Vec<u8>), String> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(ScriptedUpstream { calls: Mutex::new(0), rule: Box::new(rule) })
        }
    }

    #[async_trait]
    impl ReplayTransport for ScriptedUpstream {
        async fn send(
            &self,
            request: &RequestTemplate,
        ) -> Result<TransportResponse, TransportError> {
            let call = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls
            };
            let names: Vec<String> =
                request.cookies().into_iter().map(|c| c.name).collect();
            match (self.rule)(&names, call) {
                Ok((status, body)) => Ok(TransportResponse { status, body }),
                Err(reason) => Err(TransportError::Network(reason)),
            }
        }
    }

    fn has(names: &[String], wanted: &str) -> bool {
        names.iter().any(|n| n == wanted)
    }

    fn template(cookies: &[(&str, &str)]) -> (RequestTemplate, Vec<Cookie>) {
        let list: Vec<Cookie> = cookies.iter().map(|(n, v)| Cookie::new(*n, *v)).collect();
        let header = list
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        let mut headers = vec![("Host".to_string(), "app.example.com".to_string())];
        if !header.is_empty() {
            headers.push(("Cookie".to_string(), header));
        }
        let template = RequestTemplate {
            method: "GET".into(),
            url: "https://app.example.com/account".into(),
            headers,
            body: Vec::new(),
        };
        (template, list)
    }

    fn no_double_check() -> SolverOptions {
        SolverOptions { double_check: false, ..SolverOptions::default() }
    }

    fn names(cookies: &[Cookie]) -> Vec<&str> {
        cookies.iter().map(|c| c.name.as_str()).collect()
    }

    // ── Equivalence relation ───────────────────────────────────────────────

    #[test]
    fn equivalence_status_must_match() {
        let base = ReplayOutcome::Completed { status: 200, body_len: 100, digest: digest(b"a") };
        let other = ReplayOutcome::Completed { status: 401, body_len: 100, digest: digest(b"a") };
        assert!(!outcomes_equivalent(&base, &other, 0.05));
    }

    #[test]
    fn equivalence_accepts_length_within_slack() {
        let base = ReplayOutcome::Completed { status: 200, body_len: 1000, digest: digest(b"a") };
        let close = ReplayOutcome::Completed { status: 200, body_len: 1050, digest: digest(b"b") };
        let far = ReplayOutcome::Completed { status: 200, body_len: 1051, digest: digest(b"b") };
        assert!(outcomes_equivalent(&base, &close, 0.05));
        assert!(!outcomes_equivalent(&base, &far, 0.05));
    }

    #[test]
    fn equivalence_rejects_failures() {
        let base = ReplayOutcome::Completed { status: 200, body_len: 100, digest: digest(b"a") };
        let failed = ReplayOutcome::Failed { reason: "boom".into() };
        assert!(!outcomes_equivalent(&base, &failed, 0.05));
        assert!(!outcomes_equivalent(&failed, &base, 0.05));
    }

    // ── Scenario: single required cookie among bystanders ──────────────────

    #[tokio::test]
    async fn single_required_cookie() {
        let upstream = ScriptedUpstream::new(|names, _| {
            if has(names, "sid") {
                Ok((200, OK_BODY.to_vec()))
            } else {
                Ok((401, DENIED_BODY.to_vec()))
            }
        });
        let (request, cookies) = template(&[("sid", "s1"), ("_ga", "GA1.2"), ("pref", "dark")]);
        let solver = Solver::with_options(upstream, no_double_check());
        let verdict = solver.analyze(&request, &cookies).await;

        assert_eq!(names(&verdict.required), vec!["sid"]);
        assert_eq!(names(&verdict.optional), vec!["_ga", "pref"]);
        assert!(verdict.alternatives.is_empty());
        assert!(verdict.reliable);
        // baseline + 3 individual + suspicious-only; the minimal-set entry
        // reuses that proof instead of issuing a fresh request.
        assert_eq!(verdict.requests_sent, 5);
        let labels: Vec<&str> = verdict.replays.iter().map(|r| r.label.as_str()).collect();
        assert!(labels.contains(&"BASELINE"));
        assert!(labels.contains(&"WITHOUT:sid"));
        assert!(labels.contains(&"MINIMAL SET"));
    }

    // ── Scenario: OR-alternatives ──────────────────────────────────────────

    #[tokio::test]
    async fn or_alternative_sessions() {
        let upstream = ScriptedUpstream::new(|names, _| {
            let session = has(names, "sidA") || has(names, "sidB");
            if session && has(names, "u") {
                Ok((200, OK_BODY.to_vec()))
            } else {
                Ok((403, DENIED_BODY.to_vec()))
            }
        });
        let (request, cookies) = template(&[("sidA", "a"), ("sidB", "b"), ("u", "42")]);
        let solver = Solver::with_options(upstream, no_double_check());
        let verdict = solver.analyze(&request, &cookies).await;

        // The first session cookie in input order wins the required slot.
        assert_eq!(names(&verdict.required), vec!["sidA", "u"]);
        assert_eq!(names(&verdict.optional), vec!["sidB"]);
        let subs = verdict.alternatives.get("sidA").expect("sidA should have a substitute");
        assert_eq!(names(subs), vec!["sidB"]);
        assert!(!verdict.alternatives.contains_key("u"));
        assert!(verdict.reliable);
    }

    // ── Scenario: transient upstream flake cleared by the recheck ──────────

    #[tokio::test(start_paused = true)]
    async fn flaky_removal_is_reclassified() {
        let tripped = std::sync::atomic::AtomicBool::new(false);
        let upstream = ScriptedUpstream::new(move |names, _| {
            if !has(names, "a") {
                return Ok((401, DENIED_BODY.to_vec()));
            }
            // First replay lacking `b` hits a one-off upstream blip.
            if !has(names, "b") && !tripped.swap(true, Ordering::SeqCst) {
                return Ok((500, b"<html>internal error</html>".to_vec()));
            }
            Ok((200, OK_BODY.to_vec()))
        });
        let (request, cookies) = template(&[("a", "1"), ("b", "2")]);
        let solver = Solver::new(upstream); // double-check on
        let verdict = solver.analyze(&request, &cookies).await;

        assert_eq!(names(&verdict.required), vec!["a"]);
        assert_eq!(names(&verdict.optional), vec!["b"]);
        assert!(verdict.details.get("b").unwrap().contains("recheck"));
    }

    // ── Boundary: zero cookies ─────────────────────────────────────────────

    #[tokio::test]
    async fn zero_cookies_is_baseline_only() {
        let upstream = ScriptedUpstream::new(|_, _| Ok((200, OK_BODY.to_vec())));
        let (request, _) = template(&[]);
        let solver = Solver::new(upstream);
        let verdict = solver.analyze(&request, &[]).await;

        assert!(verdict.required.is_empty());
        assert!(verdict.optional.is_empty());
        assert_eq!(verdict.requests_sent, 1);
        assert_eq!(verdict.replays.len(), 1);
        assert_eq!(verdict.replays[0].label, "BASELINE");
        assert!(verdict.baseline.is_some());
    }

    // ── Boundary: a lone required cookie is never removal-tested ───────────

    #[tokio::test]
    async fn singleton_input_skips_removal_attempt() {
        let upstream = ScriptedUpstream::new(|names, _| {
            if has(names, "sid") {
                Ok((200, OK_BODY.to_vec()))
            } else {
                Ok((401, DENIED_BODY.to_vec()))
            }
        });
        let (request, cookies) = template(&[("sid", "s1")]);
        let solver = Solver::with_options(upstream, no_double_check());
        let verdict = solver.analyze(&request, &cookies).await;

        assert_eq!(names(&verdict.required), vec!["sid"]);
        assert!(verdict.optional.is_empty());
        assert!(!verdict.replays.iter().any(|r| r.label.starts_with("MINIMIZE")));
        assert_eq!(verdict.requests_sent, 3); // baseline, WITHOUT:sid, suspicious-only
    }

    // ── Boundary: unreachable baseline ─────────────────────────────────────

    #[tokio::test]
    async fn unreachable_baseline_fails_the_analysis() {
        let upstream = ScriptedUpstream::new(|_, _| Err("connection refused".to_string()));
        let (request, cookies) = template(&[("sid", "s1"), ("_ga", "GA1.2")]);
        let solver = Solver::new(upstream);
        let verdict = solver.analyze(&request, &cookies).await;

        assert!(verdict.failed());
        assert!(verdict.required.is_empty());
        assert!(verdict.optional.is_empty());
        assert_eq!(names(&verdict.unknown), vec!["sid", "_ga"]);
        assert_eq!(verdict.requests_sent, 1);
        assert!(verdict.details.get("sid").unwrap().contains("Unknown"));
    }

    // ── Joint requirement with no individual signal ────────────────────────

    #[tokio::test]
    async fn threshold_coupling_yields_empty_required() {
        // Any two of the three cookies satisfy the upstream, so no single
        // removal disturbs the response and nothing gets flagged.
        let upstream = ScriptedUpstream::new(|names, _| {
            let present =
                ["a", "b", "c"].iter().filter(|n| has(names, n)).count();
            if present >= 2 {
                Ok((200, OK_BODY.to_vec()))
            } else {
                Ok((403, DENIED_BODY.to_vec()))
            }
        });
        let (request, cookies) = template(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let solver = Solver::with_options(upstream, no_double_check());
        let verdict = solver.analyze(&request, &cookies).await;

        assert!(verdict.required.is_empty());
        assert_eq!(verdict.optional.len(), 3);
        // The final confirmation with no cookies mismatches and says so.
        assert!(verdict.details.get(DETAIL_KEY_ANALYSIS).unwrap().contains("did not match"));
        assert_eq!(verdict.requests_sent, 5); // baseline + 3 individual + empty-set confirm
    }

    // ── Determinism & partition invariants ─────────────────────────────────

    #[tokio::test]
    async fn deterministic_upstream_gives_identical_verdicts() {
        let rule = |names: &[String], _: u32| {
            if has(names, "sid") && has(names, "csrf") {
                Ok((200, OK_BODY.to_vec()))
            } else {
                Ok((403, DENIED_BODY.to_vec()))
            }
        };
        let (request, cookies) =
            template(&[("sid", "s"), ("csrf", "t"), ("_ga", "g"), ("pref", "p")]);

        let first = Solver::with_options(ScriptedUpstream::new(rule), no_double_check())
            .analyze(&request, &cookies)
            .await;
        let second = Solver::with_options(ScriptedUpstream::new(rule), no_double_check())
            .analyze(&request, &cookies)
            .await;

        assert_eq!(names(&first.required), names(&second.required));
        assert_eq!(names(&first.optional), names(&second.optional));
        assert_eq!(first.alternatives, second.alternatives);

        // required ∪ optional = input, required ∩ optional = ∅.
        assert_eq!(first.required.len() + first.optional.len(), cookies.len());
        for cookie in &first.required {
            assert!(!first.optional.contains(cookie));
        }
        assert_eq!(names(&first.required), vec!["sid", "csrf"]);
    }

    // ── Cancellation ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancelled_run_returns_unknowns() {
        let upstream = ScriptedUpstream::new(|_, _| Ok((200, OK_BODY.to_vec())));
        let (request, cookies) = template(&[("sid", "s1"), ("_ga", "g")]);
        let solver = Solver::with_options(upstream, no_double_check());
        solver.cancel_handle().cancel();
        let verdict = solver.analyze(&request, &cookies).await;

        assert_eq!(verdict.requests_sent, 1); // baseline only
        assert_eq!(verdict.unknown.len(), 2);
        assert!(verdict.details.get(DETAIL_KEY_ANALYSIS).unwrap().contains("cancelled"));
    }
}
