use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::db::models::StockRow;
use crate::db::VerdictStore;
use crate::error::Result;
use crate::types::{now_ms, CacheRecord, Status, Verdict};

const SELECT_STOCK: &str = r#"
    SELECT ticker, company_name, price, safety_score, cash_engine_score,
           roic_current, debt_to_equity, gross_margin_3yr_avg, fcf_yield,
           status, failure_reasons, valuation_status, lie_detector_status, updated_at
    FROM stocks
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub total: i64,
    pub survivors: i64,
    pub rejected: i64,
}

/// SQLite-backed verdict store. Cheap to clone (shares the pool).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and runs migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database. A single connection, since each SQLite
    /// connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Survivors, best ROIC first.
    pub async fn survivors(&self) -> Result<Vec<CacheRecord>> {
        let sql = format!("{SELECT_STOCK} WHERE status = ? ORDER BY roic_current DESC");
        let rows = sqlx::query_as::<_, StockRow>(&sql)
            .bind(Status::Survivor.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CacheRecord::try_from).collect()
    }

    /// Rejected stocks, alphabetical.
    pub async fn rejected(&self) -> Result<Vec<CacheRecord>> {
        let sql = format!("{SELECT_STOCK} WHERE status = ? ORDER BY ticker ASC");
        let rows = sqlx::query_as::<_, StockRow>(&sql)
            .bind(Status::Rejected.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CacheRecord::try_from).collect()
    }

    pub async fn counts(&self) -> Result<StatusCounts> {
        let (total, survivors): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) FROM stocks",
        )
        .bind(Status::Survivor.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(StatusCounts {
            total,
            survivors,
            rejected: total - survivors,
        })
    }
}

#[async_trait]
impl VerdictStore for SqliteStore {
    async fn get_latest(&self, ticker: &str) -> Result<Option<CacheRecord>> {
        let sql = format!("{SELECT_STOCK} WHERE ticker = ?");
        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CacheRecord::try_from).transpose()
    }

    async fn upsert(&self, verdict: &Verdict) -> Result<()> {
        let row = StockRow::from_verdict(verdict, now_ms());
        sqlx::query(
            r#"
            INSERT INTO stocks (
                ticker, company_name, price, safety_score, cash_engine_score,
                roic_current, debt_to_equity, gross_margin_3yr_avg, fcf_yield,
                status, failure_reasons, valuation_status, lie_detector_status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                company_name = excluded.company_name,
                price = excluded.price,
                safety_score = excluded.safety_score,
                cash_engine_score = excluded.cash_engine_score,
                roic_current = excluded.roic_current,
                debt_to_equity = excluded.debt_to_equity,
                gross_margin_3yr_avg = excluded.gross_margin_3yr_avg,
                fcf_yield = excluded.fcf_yield,
                status = excluded.status,
                failure_reasons = excluded.failure_reasons,
                valuation_status = excluded.valuation_status,
                lie_detector_status = excluded.lie_detector_status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.ticker)
        .bind(&row.company_name)
        .bind(row.price)
        .bind(row.safety_score)
        .bind(row.cash_engine_score)
        .bind(row.roic_current)
        .bind(row.debt_to_equity)
        .bind(row.gross_margin_3yr_avg)
        .bind(row.fcf_yield)
        .bind(&row.status)
        .bind(&row.failure_reasons)
        .bind(&row.valuation_status)
        .bind(&row.lie_detector_status)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_verdict(ticker: &str, status: Status, roic: f64) -> Verdict {
    use crate::types::{CashQuality, ValuationBucket};

    let reasons = match status {
        Status::Survivor => Vec::new(),
        Status::Rejected => vec!["HIGH DEBT (D/E 0.90)".to_string(), "POOR CASH QUALITY".to_string()],
    };
    Verdict {
        ticker: ticker.to_string(),
        company_name: format!("{ticker} Holdings"),
        price: 101.5,
        status,
        reasons,
        valuation: ValuationBucket::Fair,
        cash_quality: CashQuality::Verified,
        cash_engine_score: 70,
        safety_score: 80,
        roic,
        debt_to_equity: 0.1,
        gross_margin: 60.0,
        fcf_yield: 6.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_read_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        let verdict = sample_verdict("KO", Status::Rejected, 12.0);
        let before = now_ms();
        store.upsert(&verdict).await.unwrap();

        let record = store.get_latest("KO").await.unwrap().expect("record stored");
        assert_eq!(record.verdict, verdict);
        assert!(record.updated_at_ms >= before);
        assert!(store.get_latest("PEP").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_prior_record() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert(&sample_verdict("KO", Status::Rejected, 12.0)).await.unwrap();
        store.upsert(&sample_verdict("KO", Status::Survivor, 31.0)).await.unwrap();

        let record = store.get_latest("KO").await.unwrap().unwrap();
        assert_eq!(record.verdict.status, Status::Survivor);
        assert!(record.verdict.reasons.is_empty());
        assert_eq!(store.counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn listings_are_ordered() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert(&sample_verdict("V", Status::Survivor, 40.0)).await.unwrap();
        store.upsert(&sample_verdict("MA", Status::Survivor, 95.0)).await.unwrap();
        store.upsert(&sample_verdict("XOM", Status::Rejected, 8.0)).await.unwrap();
        store.upsert(&sample_verdict("BA", Status::Rejected, -4.0)).await.unwrap();

        let survivors: Vec<_> = store.survivors().await.unwrap().into_iter().map(|r| r.verdict.ticker).collect();
        assert_eq!(survivors, vec!["MA", "V"]);

        let rejected: Vec<_> = store.rejected().await.unwrap().into_iter().map(|r| r.verdict.ticker).collect();
        assert_eq!(rejected, vec!["BA", "XOM"]);

        assert_eq!(
            store.counts().await.unwrap(),
            StatusCounts { total: 4, survivors: 2, rejected: 2 }
        );
    }

    #[tokio::test]
    async fn empty_table_counts_are_zero() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.counts().await.unwrap(), StatusCounts::default());
    }
}
