// ── Cookielens Atoms: Constants ────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic strings,
// makes auditing easier, and keeps every layer's code self-documenting.

use std::time::Duration;

// ── Solver ─────────────────────────────────────────────────────────────────

/// Relative body-length slack accepted by the response equivalence check.
/// Absorbs timestamps, nonces, and other small dynamic fragments.
pub const BODY_LEN_TOLERANCE: f64 = 0.05;

/// Pause before re-testing a cookie whose removal looked significant.
/// WAF blips and rate-limit hiccups usually clear within this window.
pub const RECHECK_PAUSE: Duration = Duration::from_millis(500);

/// Pause before the single minimal-set verification retry.
pub const VERIFY_RETRY_PAUSE: Duration = Duration::from_secs(1);

// ── Replay labels ──────────────────────────────────────────────────────────
// Stable identifiers for the replay log consumed by UI playback.
// Changing any of these breaks saved-session playback — treat as frozen.

pub const LABEL_BASELINE: &str = "BASELINE";
pub const LABEL_WITHOUT_PREFIX: &str = "WITHOUT:";
pub const LABEL_RECHECK_SUFFIX: &str = " RECHECK";
pub const LABEL_SUSPICIOUS_ONLY: &str = "SUSPICIOUS ONLY";
pub const LABEL_SEARCH_PREFIX: &str = "SEARCH:";
pub const LABEL_MINIMIZE_PREFIX: &str = "MINIMIZE WITHOUT:";
pub const LABEL_VERIFY_MINIMAL: &str = "VERIFY MINIMAL";
pub const LABEL_VERIFY_RETRY: &str = "VERIFY MINIMAL RETRY";
pub const LABEL_MINIMAL_SET: &str = "MINIMAL SET";

// ── Classifier pipeline ────────────────────────────────────────────────────

/// Maximum queued classification tasks. Submissions past this depth are
/// dropped (logged, never errored) so an unreachable LM cannot grow memory.
pub const QUEUE_CAPACITY: usize = 1000;

/// Worker pool size bounds and default.
pub const MIN_WORKER_THREADS: usize = 1;
pub const MAX_WORKER_THREADS: usize = 10;
pub const DEFAULT_WORKER_THREADS: usize = 3;

/// Rate-limiter capacity bounds and default (LM queries per minute).
pub const MIN_QUERIES_PER_MINUTE: u32 = 1;
pub const MAX_QUERIES_PER_MINUTE: u32 = 60;
pub const DEFAULT_QUERIES_PER_MINUTE: u32 = 10;

/// The token bucket refills to full capacity once per this interval.
pub const RATE_REFILL_INTERVAL: Duration = Duration::from_secs(60);

/// Dequeue poll timeout. Workers re-check the stop flag at this cadence,
/// which bounds how long shutdown can be ignored by an idle worker.
pub const DEQUEUE_POLL: Duration = Duration::from_secs(1);

/// Upper bound on one language-model HTTP call.
pub const LM_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits for workers before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Confidence assigned when the LM reply omits the field.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

// ── Store ──────────────────────────────────────────────────────────────────

/// Directory under the user's home holding the embedded database.
pub const STORE_DIR_NAME: &str = ".burp-cookie-db";

/// Database file name inside [`STORE_DIR_NAME`].
pub const STORE_FILE_NAME: &str = "cookies.db";

/// Current schema version recorded in the settings table.
pub const SCHEMA_VERSION: i64 = 1;
