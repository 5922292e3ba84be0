// Cookielens — cookie analysis engine.
//
// Two orthogonal halves behind one crate:
//
//   • The solver replays perturbed variants of a captured request to find
//     the minimal cookie set the upstream actually needs, plus any cookies
//     that can substitute for a required one.
//   • The classifier pipeline describes every cookie name seen in traffic,
//     cache-first against an embedded store, asking a language-model
//     service on a miss — bounded queue, worker pool, token-bucket rate
//     limit, dedup.
//
// The host proxy is consumed through the trait seams in `atoms::traits`;
// a host adapter implements them and owns process lifecycle.

// ── Cookielens Atoms (types, constants, errors, traits) ───────────────────
pub mod atoms;

// ── Cookielens Engine (solver, classifier, store, providers) ──────────────
pub mod engine;

pub use atoms::classify_types::{
    ClassifyTask, CookieCategory, Descriptor, DescriptorSource, PrivacyLevel, TaskPriority,
};
pub use atoms::error::{CoreError, CoreResult};
pub use atoms::traits::{
    AiProvider, CapturedExchange, CapturedResponse, ClassifyReply, ProviderError, ProxyHost,
    ReplayTransport, TransportError, TransportResponse,
};
pub use atoms::types::{Cookie, LabeledReplay, ReplayOutcome, RequestTemplate, Verdict};
pub use engine::auto_process::{AutoProcessor, DomainFilter};
pub use engine::classifier::{ClassifierPipeline, StatsSnapshot};
pub use engine::config::{CoreConfig, DomainFilterMode};
pub use engine::persist::{load_results, persist_verdict, PersistedResult};
pub use engine::solver::{CancelHandle, Solver, SolverOptions};
pub use engine::state::CoreState;
pub use engine::store::{CookieStore, StoreStats};
