use std::sync::atomic::{AtomicU64, Ordering};

/// Counters surfaced to logs/operators. Cheap, lock-free, and safe to share
/// across the dedicated task thread and the UI runtime.
#[derive(Debug, Default)]
pub struct ScraperMetrics {
    pub sessions_acquired: AtomicU64,
    pub session_failures: AtomicU64,
    pub pages_fetched: AtomicU64,
    pub items_harvested: AtomicU64,
    pub detail_successes: AtomicU64,
    pub detail_failures: AtomicU64,
}

impl ScraperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_acquired(&self) {
        self.sessions_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_failure(&self) {
        self.session_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_items_harvested(&self, count: u64) {
        self.items_harvested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_detail_success(&self) {
        self.detail_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detail_failure(&self) {
        self.detail_failures.fetch_add(1, Ordering::Relaxed);
    }
}
