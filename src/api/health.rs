//! Shared scan health for the /health endpoint.
//! Updated by the scanner, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// Outcome counters for the current (or last finished) scan.
#[derive(Default)]
pub struct HealthState {
    pub scan_in_progress: AtomicBool,
    /// Epoch ms when the last scan finished (0 = never).
    pub last_scan_finished_at_ms: AtomicU64,
    pub scans_completed: AtomicU64,
    /// Tickers in the current scan's universe.
    pub universe_size: AtomicU64,
    pub analyzed: AtomicU64,
    pub cached: AtomicU64,
    pub skipped: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub scan_in_progress: bool,
    pub last_scan_finished_at_ms: u64,
    pub scans_completed: u64,
    pub universe_size: u64,
    pub analyzed: u64,
    pub cached: u64,
    pub skipped: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the per-scan counters.
    pub fn begin_scan(&self, universe_size: usize) {
        self.scan_in_progress.store(true, Ordering::Relaxed);
        self.universe_size.store(universe_size as u64, Ordering::Relaxed);
        self.analyzed.store(0, Ordering::Relaxed);
        self.cached.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }

    pub fn finish_scan(&self, finished_at_ms: i64) {
        self.last_scan_finished_at_ms
            .store(finished_at_ms.max(0) as u64, Ordering::Relaxed);
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.scan_in_progress.store(false, Ordering::Relaxed);
    }

    pub fn inc_analyzed(&self) {
        self.analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cached(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            scan_in_progress: self.scan_in_progress.load(Ordering::Relaxed),
            last_scan_finished_at_ms: self.last_scan_finished_at_ms.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            universe_size: self.universe_size.load(Ordering::Relaxed),
            analyzed: self.analyzed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
