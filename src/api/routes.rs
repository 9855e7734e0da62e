use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::LatencyStats;
use crate::db::sqlite::StatusCounts;
use crate::db::{SqliteStore, VerdictStore};
use crate::error::AppError;
use crate::types::{CacheRecord, Verdict};

#[derive(Clone)]
pub struct ApiState {
    pub store: SqliteStore,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/stocks/survivors", get(get_survivors))
        .route("/stocks/rejected", get(get_rejected))
        .route("/stocks/:ticker", get(get_stock))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/latency", get(get_stats_latency))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StockResponse {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub updated_at_ms: i64,
}

impl From<CacheRecord> for StockResponse {
    fn from(record: CacheRecord) -> Self {
        Self {
            verdict: record.verdict,
            updated_at_ms: record.updated_at_ms,
        }
    }
}

#[derive(Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Epoch ms of the last finished scan, if any ran in this process.
    pub last_scan_finished_at_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_survivors(State(state): State<ApiState>) -> Result<Json<Vec<StockResponse>>, AppError> {
    let records = state.store.survivors().await?;
    Ok(Json(records.into_iter().map(StockResponse::from).collect()))
}

async fn get_rejected(State(state): State<ApiState>) -> Result<Json<Vec<StockResponse>>, AppError> {
    let records = state.store.rejected().await?;
    Ok(Json(records.into_iter().map(StockResponse::from).collect()))
}

async fn get_stock(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockResponse>, AppError> {
    let ticker = ticker.trim().to_ascii_uppercase();
    match state.store.get_latest(&ticker).await? {
        Some(record) => Ok(Json(record.into())),
        None => Err(AppError::NotFound(format!("no verdict for {ticker}"))),
    }
}

async fn get_stats_summary(State(state): State<ApiState>) -> Result<Json<SummaryResponse>, AppError> {
    let counts = state.store.counts().await?;
    let finished = state.health.snapshot().last_scan_finished_at_ms;
    Ok(Json(SummaryResponse {
        counts,
        last_scan_finished_at_ms: (finished > 0).then_some(finished),
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::db::sqlite::sample_verdict;
    use crate::types::Status;

    async fn state_with(verdicts: &[Verdict]) -> ApiState {
        let store = SqliteStore::in_memory().await.unwrap();
        for v in verdicts {
            store.upsert(v).await.unwrap();
        }
        ApiState {
            store,
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
        }
    }

    async fn get(state: ApiState, uri: &str) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn survivors_are_ordered_by_roic() {
        let state = state_with(&[
            sample_verdict("KO", Status::Survivor, 28.0),
            sample_verdict("V", Status::Survivor, 41.0),
            sample_verdict("T", Status::Rejected, 6.0),
        ])
        .await;

        let (status, body) = get(state, "/stocks/survivors").await;
        assert_eq!(status, StatusCode::OK);
        let tickers: Vec<&str> = body.as_array().unwrap().iter().map(|s| s["ticker"].as_str().unwrap()).collect();
        assert_eq!(tickers, vec!["V", "KO"]);
        assert_eq!(body[0]["valuation"], "FAIR");
        assert!(body[0]["updated_at_ms"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn rejected_rows_carry_reason_lists() {
        let state = state_with(&[
            sample_verdict("T", Status::Rejected, 6.0),
            sample_verdict("F", Status::Rejected, 3.0),
        ])
        .await;

        let (_, body) = get(state, "/stocks/rejected").await;
        assert_eq!(body[0]["ticker"], "F");
        assert_eq!(body[1]["ticker"], "T");
        assert_eq!(body[0]["status"], "REJECTED");
        assert_eq!(body[0]["reasons"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn single_stock_lookup_and_404() {
        let state = state_with(&[sample_verdict("MSFT", Status::Survivor, 30.0)]).await;

        let (status, body) = get(state.clone(), "/stocks/msft").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["company_name"], "MSFT Holdings");

        let (status, _) = get(state, "/stocks/ZZZZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn summary_counts_statuses() {
        let state = state_with(&[
            sample_verdict("KO", Status::Survivor, 28.0),
            sample_verdict("T", Status::Rejected, 6.0),
            sample_verdict("F", Status::Rejected, 3.0),
        ])
        .await;

        let (_, body) = get(state.clone(), "/stats/summary").await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["survivors"], 1);
        assert_eq!(body["rejected"], 2);
        assert!(body["last_scan_finished_at_ms"].is_null());

        state.health.finish_scan(1_700_000_000_000);
        let (_, body) = get(state, "/stats/summary").await;
        assert_eq!(body["last_scan_finished_at_ms"], 1_700_000_000_000u64);
    }

    #[tokio::test]
    async fn latency_and_health_reflect_shared_state() {
        let state = state_with(&[]).await;
        let (_, body) = get(state.clone(), "/stats/latency").await;
        assert_eq!(body["samples"], 0);
        assert!(body["p50_ms"].is_null());

        state.latency.record(Duration::from_millis(250));
        state.health.begin_scan(12);
        state.health.inc_analyzed();

        let (_, body) = get(state.clone(), "/stats/latency").await;
        assert_eq!(body["samples"], 1);
        assert!(body["p99_ms"].as_u64().unwrap() >= 250);

        let (_, body) = get(state, "/health").await;
        assert_eq!(body["scan_in_progress"], true);
        assert_eq!(body["universe_size"], 12);
        assert_eq!(body["analyzed"], 1);
    }
}
