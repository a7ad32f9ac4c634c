//! Run-wide atomic counters, logged as a single summary at shutdown
//!
//! Stands in for the external statistics/progress printer: every component
//! updates its own counters as it works, and the runner logs a summary line
//! from them once, at `Closed`, rather than maintaining a live display.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct RunStats {
    pub hosts_materialized: AtomicU64,
    pub queries_issued: AtomicU64,
    pub results_emitted: AtomicU64,
    pub wildcards_removed: AtomicU64,
    pub errors_absorbed: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hosts_materialized(&self, n: u64) {
        self.hosts_materialized.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_queries_issued(&self) {
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_results_emitted(&self) {
        self.results_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_wildcards_removed(&self, n: u64) {
        self.wildcards_removed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_errors_absorbed(&self) {
        self.errors_absorbed.fetch_add(1, Ordering::Relaxed);
    }

    /// Logs a single summary line. Called once at shutdown when `--stats`
    /// is set.
    pub fn log_summary(&self) {
        info!(
            hosts_materialized = self.hosts_materialized.load(Ordering::Relaxed),
            queries_issued = self.queries_issued.load(Ordering::Relaxed),
            results_emitted = self.results_emitted.load(Ordering::Relaxed),
            wildcards_removed = self.wildcards_removed.load(Ordering::Relaxed),
            errors_absorbed = self.errors_absorbed.load(Ordering::Relaxed),
            "run summary"
        );
    }
}
