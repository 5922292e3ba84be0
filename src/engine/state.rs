// ── Cookielens Engine: Core State ──────────────────────────────────────────
// Explicit construction of the long-lived pieces: configuration snapshot,
// store connection, LM provider, classifier pipeline, passive hook. One
// `CoreState` per host-extension initialization; handles are passed into
// consumers rather than reached through module-scope globals.

use log::info;
use std::sync::Arc;

use crate::atoms::error::CoreResult;
use crate::atoms::traits::{ProxyHost, ReplayTransport};
use crate::engine::auto_process::{AutoProcessor, DomainFilter};
use crate::engine::classifier::ClassifierPipeline;
use crate::engine::config::CoreConfig;
use crate::engine::providers::AnyProvider;
use crate::engine::solver::{Solver, SolverOptions};
use crate::engine::store::CookieStore;

pub struct CoreState {
    pub config: CoreConfig,
    pub store: Arc<CookieStore>,
    pub pipeline: Arc<ClassifierPipeline>,
    pub auto: AutoProcessor,
    host: Arc<dyn ProxyHost>,
}

impl CoreState {
    /// Wire everything up from the host's preferences. Must be called from
    /// within a tokio runtime (the pipeline spawns its workers here).
    pub fn initialize(host: Arc<dyn ProxyHost>) -> CoreResult<Self> {
        let config = CoreConfig::from_host(host.as_ref());
        info!(
            "[core] initializing: provider={}, workers={}, {}/min",
            config.ai_provider, config.worker_threads, config.queries_per_minute
        );

        let store = Arc::new(CookieStore::open(config.db_path.as_deref())?);
        let provider = Arc::new(AnyProvider::from_config(&config));
        let pipeline = Arc::new(ClassifierPipeline::new(
            store.clone(),
            provider,
            config.worker_threads,
            config.queries_per_minute,
        ));
        let auto = AutoProcessor::new(
            pipeline.clone(),
            host.clone(),
            DomainFilter::new(config.domain_filter_mode, config.domain_filter_domains.clone()),
            config.auto_process,
        );

        Ok(CoreState { config, store, pipeline, auto, host })
    }

    /// A solver bound to the given replay transport. One per analysis job;
    /// each carries its own cancel handle.
    pub fn solver(&self, transport: Arc<dyn ReplayTransport>) -> Solver {
        Solver::new(transport)
    }

    pub fn solver_with_options(
        &self,
        transport: Arc<dyn ReplayTransport>,
        options: SolverOptions,
    ) -> Solver {
        Solver::with_options(transport, options)
    }

    pub fn host(&self) -> &Arc<dyn ProxyHost> {
        &self.host
    }

    /// Stop the classifier; the store closes when the last handle drops.
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        info!("[core] shut down");
    }
}
