mod analysis;
mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod rescan;
mod scanner;
mod types;
mod universe;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{FreshnessGate, VerdictEngine};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::{MemoryStore, SqliteStore};
use crate::error::Result;
use crate::fetcher::{FinancialDataSource, YahooClient};
use crate::rescan::Rescanner;
use crate::scanner::Scanner;
use crate::universe::{load_universe, CsvUniverse, StaticUniverse, TickerProvider};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let t = &cfg.thresholds;
    info!(
        "Thresholds: gross margin >= {:.0}% | ROIC >= {:.0}% | D/E <= {:.2} | FCF yield >= {:.1}% | cache: {}d | workers: {}",
        t.min_gross_margin,
        t.min_roic,
        t.max_debt_to_equity,
        t.min_fcf_yield,
        cfg.cache_duration_days,
        cfg.scan_workers,
    );

    let source: Arc<dyn FinancialDataSource> = Arc::new(YahooClient::new(
        cfg.yahoo_api_url.clone(),
        cfg.yahoo_consent_url.clone(),
    )?);
    let provider: Arc<dyn TickerProvider> = if cfg.tickers.is_empty() {
        Arc::new(CsvUniverse::new(cfg.universe_url.clone())?)
    } else {
        info!("Using TICKERS override ({} tickers)", cfg.tickers.len());
        Arc::new(StaticUniverse(cfg.tickers.clone()))
    };
    let gate = FreshnessGate::new(cfg.cache_window());
    let engine = VerdictEngine::new(cfg.thresholds);
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Dry run: memory only, single pass ---
    if cfg.dry_run {
        if cfg.serve_api {
            warn!("DRY_RUN is set: SERVE_API ignored, nothing is persisted");
        }
        let store = Arc::new(MemoryStore::new());
        let scanner = Scanner::new(source, store.clone(), gate, engine).with_metrics(health, latency);
        let tickers = load_universe(provider.as_ref()).await;
        scanner.run(&tickers, cfg.scan_workers).await;
        info!("Dry run complete: {} verdicts held in memory", store.len());
        return Ok(());
    }

    // --- Database setup ---
    let store = SqliteStore::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Startup scan ---
    let scanner = Arc::new(
        Scanner::new(source, Arc::new(store.clone()), gate, engine)
            .with_metrics(Arc::clone(&health), Arc::clone(&latency)),
    );
    let tickers = load_universe(provider.as_ref()).await;
    scanner.run(&tickers, cfg.scan_workers).await;

    if !cfg.serve_api {
        return Ok(());
    }

    // Periodic rescans (background)
    if let Some(every) = cfg.rescan_interval() {
        let rescanner = Rescanner::new(Arc::clone(&scanner), provider, every, cfg.scan_workers);
        info!("Rescanning every {}h", cfg.rescan_interval_hours);
        tokio::spawn(async move { rescanner.run().await });
    }

    // HTTP API server
    let app = router(ApiState { store, health, latency });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
