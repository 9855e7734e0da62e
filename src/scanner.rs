use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::analysis::{Freshness, FreshnessGate, VerdictEngine};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::db::VerdictStore;
use crate::error::Result;
use crate::fetcher::{log_degraded, FinancialDataSource};
use crate::types::{now_ms, CacheRecord, CompanyFinancials, Status, Verdict};

/// What happened to one ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A fresh stored verdict was reused; nothing was fetched.
    Cached(Verdict),
    /// Analysed and (unless the write failed) persisted.
    Fresh(Verdict),
    /// Fetch failed or the quote was unusable; nothing was written.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    pub universe: usize,
    pub analyzed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub survivors: usize,
    pub elapsed: Duration,
}

impl ScanSummary {
    pub fn tickers_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.universe as f64 / secs
        } else {
            0.0
        }
    }
}

/// Runs the per-ticker pipeline: freshness gate → fetch → verdict → persist.
pub struct Scanner {
    source: Arc<dyn FinancialDataSource>,
    store: Arc<dyn VerdictStore>,
    gate: FreshnessGate,
    engine: VerdictEngine,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn FinancialDataSource>,
        store: Arc<dyn VerdictStore>,
        gate: FreshnessGate,
        engine: VerdictEngine,
    ) -> Self {
        Self {
            source,
            store,
            gate,
            engine,
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
        }
    }

    /// Shares health and latency state with the API.
    pub fn with_metrics(mut self, health: Arc<HealthState>, latency: Arc<LatencyStats>) -> Self {
        self.health = health;
        self.latency = latency;
        self
    }

    /// Screens one ticker. Never fails: every error is logged and contained here.
    pub async fn analyze(&self, ticker: &str) -> Outcome {
        if let Freshness::Reuse(verdict) = self.gate.check(self.prior_record(ticker).await, now_ms()) {
            log_cached(&verdict);
            self.health.inc_cached();
            return Outcome::Cached(verdict);
        }

        let started = Instant::now();
        let verdict = match self.compute(ticker).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                info!(event = "SKIPPED", ticker, "{ticker}: no usable quote, skipped");
                self.health.inc_skipped();
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!(event = "SKIPPED", ticker, "{ticker}: fetch failed, skipped: {e}");
                self.health.inc_skipped();
                return Outcome::Skipped;
            }
        };

        if let Err(e) = self.store.upsert(&verdict).await {
            warn!(ticker, "{ticker}: result not saved: {e}");
        }
        self.latency.record(started.elapsed());
        self.health.inc_analyzed();
        log_verdict(&verdict);
        Outcome::Fresh(verdict)
    }

    /// A failed read counts as "no record". Skipped entirely when caching is off.
    async fn prior_record(&self, ticker: &str) -> Option<CacheRecord> {
        if !self.gate.is_enabled() {
            return None;
        }
        match self.store.get_latest(ticker).await {
            Ok(record) => record,
            Err(e) => {
                warn!(ticker, "{ticker}: cache read failed, recomputing: {e}");
                None
            }
        }
    }

    async fn compute(&self, ticker: &str) -> Result<Option<Verdict>> {
        let Some(snapshot) = self.source.fetch_snapshot(ticker).await? else {
            return Ok(None);
        };
        let statements = self.source.fetch_statements(ticker).await?;
        let cash_flow = match self.source.fetch_cash_flow(ticker).await {
            Ok(table) => table,
            Err(e) => {
                log_degraded(ticker, "cash flow", &e);
                None
            }
        };

        let financials = CompanyFinancials {
            snapshot,
            statements,
            cash_flow,
        };
        Ok(Some(self.engine.assess(ticker, &financials)))
    }

    /// Screens `tickers` with at most `workers` in flight. Order of completion is unspecified.
    pub async fn run(&self, tickers: &[String], workers: usize) -> ScanSummary {
        self.health.begin_scan(tickers.len());
        info!(
            "--- SCANNING {} TICKERS (workers: {}, cache: {}) ---",
            tickers.len(),
            workers.max(1),
            if self.gate.is_enabled() { "on" } else { "off" },
        );
        let started = Instant::now();

        // Owned tickers keep the stream's futures `Send` for spawned rescans.
        let outcomes: Vec<Outcome> = stream::iter(tickers.iter().cloned())
            .map(|ticker| async move { self.analyze(&ticker).await })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

        let mut summary = ScanSummary {
            universe: tickers.len(),
            elapsed: started.elapsed(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome {
                Outcome::Cached(v) | Outcome::Fresh(v) => {
                    if matches!(outcome, Outcome::Cached(_)) {
                        summary.cached += 1;
                    } else {
                        summary.analyzed += 1;
                    }
                    if v.status == Status::Survivor {
                        summary.survivors += 1;
                    }
                }
                Outcome::Skipped => summary.skipped += 1,
            }
        }

        self.health.finish_scan(now_ms());
        info!(
            event = "SCAN_DONE",
            analyzed = summary.analyzed,
            cached = summary.cached,
            skipped = summary.skipped,
            survivors = summary.survivors,
            "DONE | scanned {} tickers in {:.2}s | {:.2} tickers/sec | survivors: {}",
            summary.universe,
            summary.elapsed.as_secs_f64(),
            summary.tickers_per_sec(),
            summary.survivors,
        );
        summary
    }
}

fn log_verdict(v: &Verdict) {
    match v.status {
        Status::Survivor => info!(
            event = "VERDICT",
            ticker = %v.ticker,
            status = %v.status,
            valuation = %v.valuation,
            fcf_yield = v.fcf_yield,
            "{}: SURVIVOR | yield: {:.1}% | {}",
            v.ticker, v.fcf_yield, v.valuation,
        ),
        Status::Rejected => info!(
            event = "VERDICT",
            ticker = %v.ticker,
            status = %v.status,
            "{}: REJECTED | {}",
            v.ticker, truncate(&v.joined_reasons(), 100),
        ),
    }
}

fn log_cached(v: &Verdict) {
    let detail = match v.status {
        Status::Survivor => format!("yield: {:.1}%", v.fcf_yield),
        Status::Rejected if v.reasons.is_empty() => "Unknown".to_string(),
        Status::Rejected => truncate(&v.joined_reasons(), 100),
    };
    info!(
        event = "CACHED",
        ticker = %v.ticker,
        status = %v.status,
        "{} [CACHED]: {} | {}",
        v.ticker, v.status, detail,
    );
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
