// ── Cookielens Engine: Classifier Pipeline ─────────────────────────────────
//
// Bounded work queue + fixed worker pool + token-bucket rate limiter +
// cookie store + LM adapter, wired together:
//
//   submit ──► dedup (in-flight set) ──► queue (≤1000, drop on overflow)
//                                          │
//                              workers (N) ┴─► store check ─ hit ─► done
//                                          │        miss / force_refresh
//                                          └─► token ─► LM ─► persist ─► done
//
// Orthogonal to the solver: nothing here influences which cookies are
// deemed required, and the solver never consults a descriptor.
//
// Invariants:
//   • at most one task per identity (name|domain) queued or in flight;
//   • an LM-fetched descriptor is persisted before the task counts as done;
//   • processed == cache_hits + ai_queries + failures.

use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::atoms::classify_types::{ClassifyTask, Descriptor};
use crate::atoms::constants::{DEQUEUE_POLL, QUEUE_CAPACITY, RATE_REFILL_INTERVAL, SHUTDOWN_GRACE};
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::traits::AiProvider;
use crate::engine::rate_limit::TokenBucket;
use crate::engine::store::{CookieStore, StoreStats};

// ── Statistics ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    queue_size: AtomicU64,
    processed: AtomicU64,
    cache_hits: AtomicU64,
    ai_queries: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time pipeline counters for the UI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub queue_size: u64,
    pub in_flight: u64,
    pub processed: u64,
    pub cache_hits: u64,
    pub ai_queries: u64,
    pub failures: u64,
    pub cache_hit_rate: f64,
}

// ── Pipeline ───────────────────────────────────────────────────────────────

struct PipelineInner {
    store: Arc<CookieStore>,
    provider: Arc<dyn AiProvider>,
    limiter: TokenBucket,
    /// Identities currently queued or being processed.
    in_flight: Mutex<HashSet<String>>,
    stats: Counters,
    stopping: AtomicBool,
}

pub struct ClassifierPipeline {
    tx: mpsc::Sender<ClassifyTask>,
    inner: Arc<PipelineInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    refill: Mutex<Option<JoinHandle<()>>>,
}

/// How one dequeued task ended.
enum TaskOutcome {
    CacheHit,
    Classified,
    Failed,
    /// Shutdown interrupted the task before anything was persisted.
    Aborted,
}

impl ClassifierPipeline {
    /// Build the pipeline and start its workers and refill timer. Must be
    /// called from within a tokio runtime. Worker count and rate capacity
    /// are fixed for the pipeline's lifetime; reconfigure by rebuilding.
    pub fn new(
        store: Arc<CookieStore>,
        provider: Arc<dyn AiProvider>,
        worker_count: usize,
        queries_per_minute: u32,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ClassifyTask>(QUEUE_CAPACITY);
        let inner = Arc::new(PipelineInner {
            store,
            provider,
            limiter: TokenBucket::new(queries_per_minute),
            in_flight: Mutex::new(HashSet::new()),
            stats: Counters::default(),
            stopping: AtomicBool::new(false),
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let inner = inner.clone();
            let rx = rx.clone();
            workers.push(tokio::spawn(worker_loop(index, inner, rx)));
        }

        let refill_inner = inner.clone();
        let refill = tokio::spawn(async move {
            loop {
                tokio::time::sleep(RATE_REFILL_INTERVAL).await;
                if refill_inner.stopping.load(Ordering::Relaxed) {
                    break;
                }
                refill_inner.limiter.refill();
            }
        });

        info!(
            "[classifier] pipeline started: {} workers, {} queries/minute",
            worker_count, queries_per_minute
        );
        ClassifierPipeline {
            tx,
            inner,
            workers: Mutex::new(workers),
            refill: Mutex::new(Some(refill)),
        }
    }

    /// Submit a task. Never blocks and never errors: duplicates of a task
    /// already queued or in flight are collapsed, and submissions during
    /// overflow are dropped with a log line.
    pub fn submit(&self, task: ClassifyTask) {
        let identity = task.identity();
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.contains(&identity) {
            return;
        }
        match self.tx.try_send(task) {
            Ok(()) => {
                in_flight.insert(identity);
                self.inner.stats.queue_size.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(task)) => {
                warn!("[classifier] queue full, dropping {}", task.identity());
            }
            Err(TrySendError::Closed(_)) => {
                warn!("[classifier] pipeline stopped, dropping {}", identity);
            }
        }
    }

    pub fn statistics(&self) -> StatsSnapshot {
        let stats = &self.inner.stats;
        let processed = stats.processed.load(Ordering::Relaxed);
        let cache_hits = stats.cache_hits.load(Ordering::Relaxed);
        StatsSnapshot {
            queue_size: stats.queue_size.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.lock().len() as u64,
            processed,
            cache_hits,
            ai_queries: stats.ai_queries.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            cache_hit_rate: if processed == 0 { 0.0 } else { cache_hits as f64 / processed as f64 },
        }
    }

    /// Stop taking work, wait up to the grace period for workers to drain
    /// their current task, then force-terminate the stragglers.
    pub async fn shutdown(&self) {
        info!("[classifier] shutting down");
        self.inner.stopping.store(true, Ordering::Relaxed);
        if let Some(refill) = self.refill.lock().take() {
            refill.abort();
        }
        let mut handles = std::mem::take(&mut *self.workers.lock());
        let drained = timeout(SHUTDOWN_GRACE, async {
            for handle in &mut handles {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("[classifier] grace period elapsed, force-terminating workers");
            for handle in &handles {
                handle.abort();
            }
        }
    }

    // ── Blocking UI surface ────────────────────────────────────────────────

    /// Cache-first descriptor fetch, asking the LM on a miss. Blocks on
    /// the rate limiter like any other LM call; meant for editor dialogs,
    /// never for the traffic hot path.
    pub async fn get_cookie_info(&self, name: &str, domain: &str) -> CoreResult<Descriptor> {
        if let Some(found) = self.inner.store.lookup(name)? {
            return Ok(found);
        }
        if !self.inner.limiter.acquire(&self.inner.stopping).await {
            return Err(CoreError::Shutdown);
        }
        let reply = self
            .inner
            .provider
            .classify(name, domain)
            .await
            .map_err(|e| CoreError::provider(self.inner.provider.name(), e.to_string()))?;
        self.inner.store.upsert_descriptor(&reply.descriptor)?;
        if let Err(e) = self.inner.store.cache_raw_response(name, domain, &reply.raw_response) {
            error!("[classifier] raw-response cache write failed: {}", e);
        }
        self.inner.stats.ai_queries.fetch_add(1, Ordering::Relaxed);
        Ok(reply.descriptor)
    }

    /// Cache-only lookup; never blocks on the LM.
    pub fn get_cookie_info_cached(&self, name: &str) -> CoreResult<Option<Descriptor>> {
        self.inner.store.lookup(name)
    }

    pub fn upsert_cookie_info(&self, descriptor: &Descriptor) -> CoreResult<()> {
        self.inner.store.upsert_descriptor(descriptor)
    }

    pub fn delete_cookie_info(&self, name: &str) -> CoreResult<()> {
        self.inner.store.delete_by_name(name)
    }

    pub fn list_all(&self) -> CoreResult<Vec<Descriptor>> {
        self.inner.store.list_all()
    }

    pub fn store_statistics(&self) -> CoreResult<StoreStats> {
        self.inner.store.statistics()
    }
}

// ── Workers ────────────────────────────────────────────────────────────────

async fn worker_loop(
    index: usize,
    inner: Arc<PipelineInner>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ClassifyTask>>>,
) {
    info!("[classifier] worker {} up", index);
    loop {
        if inner.stopping.load(Ordering::Relaxed) {
            break;
        }
        let task = {
            let mut rx = rx.lock().await;
            match timeout(DEQUEUE_POLL, rx.recv()).await {
                Ok(Some(task)) => task,
                Ok(None) => break,   // channel closed
                Err(_) => continue,  // poll timeout; re-check the stop flag
            }
        };
        inner.stats.queue_size.fetch_sub(1, Ordering::Relaxed);

        let identity = task.identity();
        let outcome = classify_task(&inner, &task).await;
        inner.in_flight.lock().remove(&identity);
        match outcome {
            TaskOutcome::CacheHit => {
                inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                inner.stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Classified => {
                inner.stats.ai_queries.fetch_add(1, Ordering::Relaxed);
                inner.stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Failed => {
                inner.stats.failures.fetch_add(1, Ordering::Relaxed);
                inner.stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            // Shutdown took the worker mid-task; nothing was persisted and
            // nothing is counted. A later submission may retry.
            TaskOutcome::Aborted => {}
        }
    }
    info!("[classifier] worker {} down", index);
}

async fn classify_task(inner: &Arc<PipelineInner>, task: &ClassifyTask) -> TaskOutcome {
    if !task.force_refresh {
        match inner.store.lookup(&task.cookie_name) {
            Ok(Some(_)) => return TaskOutcome::CacheHit,
            Ok(None) => {}
            // A read failure is not poison: fall through and re-query the
            // LM; the next run may find the store healthy again.
            Err(e) => error!("[classifier] store lookup failed for {}: {}", task.cookie_name, e),
        }
    }

    if !inner.limiter.acquire(&inner.stopping).await {
        return TaskOutcome::Aborted;
    }

    match inner.provider.classify(&task.cookie_name, &task.domain).await {
        Ok(reply) => {
            if let Err(e) = inner.store.upsert_descriptor(&reply.descriptor) {
                error!("[classifier] persist failed for {}: {}", task.cookie_name, e);
                return TaskOutcome::Failed;
            }
            if let Err(e) =
                inner.store.cache_raw_response(&task.cookie_name, &task.domain, &reply.raw_response)
            {
                // Descriptor landed; only the audit blob is missing.
                error!("[classifier] raw-response cache write failed: {}", e);
            }
            TaskOutcome::Classified
        }
        Err(e) => {
            warn!("[classifier] LM failed for {}: {}", task.cookie_name, e);
            TaskOutcome::Failed
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
