use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::scanner::Scanner;
use crate::universe::{load_universe, TickerProvider};

/// Re-runs the full scan on a fixed interval while the API is being served.
/// Each pass reloads the universe; the freshness gate decides what is refetched.
pub struct Rescanner {
    scanner: Arc<Scanner>,
    provider: Arc<dyn TickerProvider>,
    every: Duration,
    workers: usize,
}

impl Rescanner {
    pub fn new(scanner: Arc<Scanner>, provider: Arc<dyn TickerProvider>, every: Duration, workers: usize) -> Self {
        Self {
            scanner,
            provider,
            every,
            workers,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.every);
        // A scan that overruns the interval waits for the next slot instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // first tick is immediate; startup scan already ran

        loop {
            ticker.tick().await;
            self.rescan().await;
        }
    }

    async fn rescan(&self) {
        let tickers = load_universe(self.provider.as_ref()).await;
        let summary = self.scanner.run(&tickers, self.workers).await;
        info!(
            analyzed = summary.analyzed,
            cached = summary.cached,
            skipped = summary.skipped,
            "Rescan complete: {} tickers, {} survivors",
            summary.universe,
            summary.survivors,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::analysis::table::StatementTable;
    use crate::analysis::{FreshnessGate, VerdictEngine};
    use crate::api::health::HealthState;
    use crate::api::latency::LatencyStats;
    use crate::config::Thresholds;
    use crate::db::MemoryStore;
    use crate::error::{AppError, Result};
    use crate::fetcher::FinancialDataSource;
    use crate::types::{FinancialSnapshot, Statements};
    use crate::universe::StaticUniverse;

    const HOUR: Duration = Duration::from_secs(3_600);

    /// Fails every fetch, after `delay` for the snapshot.
    struct OfflineSource {
        delay: Duration,
    }

    #[async_trait]
    impl FinancialDataSource for OfflineSource {
        async fn fetch_snapshot(&self, _ticker: &str) -> Result<Option<FinancialSnapshot>> {
            tokio::time::sleep(self.delay).await;
            Err(AppError::Fetch("offline".to_string()))
        }

        async fn fetch_statements(&self, _ticker: &str) -> Result<Statements> {
            Err(AppError::Fetch("offline".to_string()))
        }

        async fn fetch_cash_flow(&self, _ticker: &str) -> Result<Option<StatementTable>> {
            Err(AppError::Fetch("offline".to_string()))
        }
    }

    /// Spawns a rescanner over `tickers`, returning the shared health counters.
    fn spawn_rescanner(delay: Duration, tickers: &[&str]) -> (Arc<HealthState>, tokio::task::JoinHandle<()>) {
        let health = Arc::new(HealthState::new());
        let scanner = Scanner::new(
            Arc::new(OfflineSource { delay }),
            Arc::new(MemoryStore::new()),
            FreshnessGate::new(Duration::ZERO),
            VerdictEngine::new(Thresholds::default()),
        )
        .with_metrics(Arc::clone(&health), Arc::new(LatencyStats::new()));
        let provider = Arc::new(StaticUniverse(tickers.iter().map(|t| t.to_string()).collect()));
        let rescanner = Rescanner::new(Arc::new(scanner), provider, HOUR, 1);
        (health, tokio::spawn(rescanner.run()))
    }

    #[tokio::test(start_paused = true)]
    async fn rescans_on_each_interval() {
        let (health, handle) = spawn_rescanner(Duration::ZERO, &["KO", "PEP"]);

        tokio::time::sleep(HOUR * 2 + Duration::from_secs(60)).await;
        let snapshot = health.snapshot();
        assert_eq!(snapshot.scans_completed, 2);
        assert_eq!(snapshot.skipped, 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_scan_waits_for_next_slot() {
        // Each pass takes 90 minutes: the first runs 1h..2h30, the missed 2h slot is
        // skipped, so the second starts at 3h rather than immediately at 2h30.
        let (health, handle) = spawn_rescanner(Duration::from_secs(90 * 60), &["KO"]);

        tokio::time::sleep(HOUR * 2 + Duration::from_secs(45 * 60)).await;
        let snapshot = health.snapshot();
        assert_eq!(snapshot.scans_completed, 1);
        assert!(!snapshot.scan_in_progress);

        tokio::time::sleep(HOUR).await; // 3h45
        let snapshot = health.snapshot();
        assert_eq!(snapshot.scans_completed, 1);
        assert!(snapshot.scan_in_progress);
        handle.abort();
    }
}
