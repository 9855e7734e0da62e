use std::time::Duration;

use crate::types::{CacheRecord, Verdict};

#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    /// Stored verdict is recent enough; return it untouched.
    Reuse(Verdict),
    Recompute,
}

/// Decides whether a stored verdict may stand in for a fresh analysis.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessGate {
    window_ms: i64,
}

impl FreshnessGate {
    /// A zero window disables reuse entirely.
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.window_ms > 0
    }

    /// Fresh iff `now - updated_at < window`. A record exactly one window old is stale.
    pub fn check(&self, prior: Option<CacheRecord>, now_ms: i64) -> Freshness {
        if !self.is_enabled() {
            return Freshness::Recompute;
        }
        match prior {
            Some(record) if now_ms.saturating_sub(record.updated_at_ms) < self.window_ms => {
                Freshness::Reuse(record.verdict)
            }
            _ => Freshness::Recompute,
        }
    }
}
