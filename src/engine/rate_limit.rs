// ── Cookielens Engine: LM Rate Limiter ─────────────────────────────────────
// Token bucket with bulk refill: capacity Q, refilled to full once per
// minute by the pipeline's timer task. Tokens gate language-model calls
// only — cache hits never touch the bucket.
//
// `acquire` blocks until a token is available, polling the stop flag once
// per second so shutdown is never ignored for long.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::atoms::constants::DEQUEUE_POLL;

pub struct TokenBucket {
    capacity: u32,
    tokens: Mutex<u32>,
    refilled: Notify,
}

impl TokenBucket {
    /// A bucket that starts full.
    pub fn new(capacity: u32) -> Self {
        TokenBucket { capacity, tokens: Mutex::new(capacity), refilled: Notify::new() }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn available(&self) -> u32 {
        *self.tokens.lock()
    }

    /// Take one token if any remain.
    pub fn try_acquire(&self) -> bool {
        let mut tokens = self.tokens.lock();
        if *tokens == 0 {
            return false;
        }
        *tokens -= 1;
        true
    }

    /// Take one token, waiting across refills if the bucket is dry.
    /// Returns `false` when `stopping` was raised while waiting.
    pub async fn acquire(&self, stopping: &AtomicBool) -> bool {
        loop {
            if stopping.load(Ordering::Relaxed) {
                return false;
            }
            if self.try_acquire() {
                return true;
            }
            // Wake on refill, or after a second to re-check the stop flag.
            let _ = timeout(DEQUEUE_POLL, self.refilled.notified()).await;
        }
    }

    /// Restore the bucket to full capacity and wake all waiters.
    pub fn refill(&self) {
        *self.tokens.lock() = self.capacity;
        self.refilled.notify_waiters();
    }
}
