use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::analysis::table::{LineItem, StatementTable};
use crate::config::{FETCH_ATTEMPTS, HTTP_TIMEOUT_SECS, RETRY_DELAY_MS};
use crate::error::{AppError, Result};
use crate::types::{FinancialSnapshot, Statements};

/// Where per-company financial facts come from. Every method may come back
/// empty; callers degrade instead of failing.
#[async_trait]
pub trait FinancialDataSource: Send + Sync {
    /// `Ok(None)` when the source has no usable quote (no current price).
    async fn fetch_snapshot(&self, ticker: &str) -> Result<Option<FinancialSnapshot>>;

    async fn fetch_statements(&self, ticker: &str) -> Result<Statements>;

    async fn fetch_cash_flow(&self, ticker: &str) -> Result<Option<StatementTable>>;
}

const SNAPSHOT_MODULES: &str = "price,financialData,defaultKeyStatistics";
const STATEMENT_MODULES: &str = "incomeStatementHistory,balanceSheetHistory";
const CASH_FLOW_MODULES: &str = "cashflowStatementHistory";

/// Source field → line item, per statement.
const INCOME_FIELDS: &[(&str, LineItem)] = &[
    ("totalRevenue", LineItem::TotalRevenue),
    ("grossProfit", LineItem::GrossProfit),
    ("netIncome", LineItem::NetIncome),
];

const BALANCE_FIELDS: &[(&str, LineItem)] = &[
    ("longTermDebt", LineItem::LongTermDebt),
    ("currentDebt", LineItem::CurrentDebt),
    ("shortLongTermDebt", LineItem::ShortLongTermDebt),
    ("totalStockholderEquity", LineItem::StockholderEquity),
];

const CASH_FLOW_FIELDS: &[(&str, LineItem)] = &[
    ("freeCashFlow", LineItem::FreeCashFlow),
    ("totalCashFromOperatingActivities", LineItem::OperatingCashFlow),
    ("capitalExpenditures", LineItem::CapitalExpenditure),
];

/// Yahoo Finance `quoteSummary` client.
///
/// Requests carry a session cookie and a crumb. Both are obtained lazily on
/// the first request and reused until the source answers 401.
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
    consent_url: String,
    crumb: Mutex<Option<String>>,
    retry_delay: Duration,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>, consent_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0")
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            consent_url: consent_url.into(),
            crumb: Mutex::new(None),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Base delay for the linear retry backoff.
    #[cfg(test)]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Bounded retry with linear backoff: attempt `n` waits `n * retry_delay` before the next.
    async fn quote_summary(&self, ticker: &str, modules: &str) -> Result<Value> {
        let mut last_err = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.try_quote_summary(ticker, modules).await {
                Ok(v) => return quote_summary_result(v),
                Err(e) => {
                    debug!(ticker, attempt, "quoteSummary {modules} failed: {e}");
                    last_err = Some(e);
                    if attempt < FETCH_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::Fetch(format!("no attempt made for {ticker}"))))
    }

    async fn try_quote_summary(&self, ticker: &str, modules: &str) -> Result<Value> {
        let crumb = self.crumb().await?;
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, ticker);
        let resp = self
            .client
            .get(&url)
            .query(&[("modules", modules), ("crumb", crumb.as_str())])
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_crumb(&crumb).await;
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    /// Cached crumb, or a fresh one from the consent + getcrumb handshake.
    /// The lock is held across the handshake so concurrent workers share one.
    async fn crumb(&self) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // The consent host usually answers 404 but still sets the cookie.
        if let Err(e) = self.client.get(&self.consent_url).send().await {
            debug!("consent request failed: {e}");
        }

        let crumb = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?
            .trim()
            .to_string();
        if crumb.is_empty() {
            return Err(AppError::Fetch("getcrumb returned an empty crumb".to_string()));
        }
        debug!("obtained session crumb");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    /// Drops `stale` unless another worker already replaced it.
    async fn invalidate_crumb(&self, stale: &str) {
        let mut cached = self.crumb.lock().await;
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }
}

#[async_trait]
impl FinancialDataSource for YahooClient {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<Option<FinancialSnapshot>> {
        let result = self.quote_summary(ticker, SNAPSHOT_MODULES).await?;
        Ok(parse_snapshot(&result))
    }

    async fn fetch_statements(&self, ticker: &str) -> Result<Statements> {
        let result = self.quote_summary(ticker, STATEMENT_MODULES).await?;
        Ok(parse_statements(&result))
    }

    async fn fetch_cash_flow(&self, ticker: &str) -> Result<Option<StatementTable>> {
        let result = self.quote_summary(ticker, CASH_FLOW_MODULES).await?;
        let periods = statement_array(&result, "cashflowStatementHistory", "cashflowStatements");
        Ok(parse_statement_table(periods, CASH_FLOW_FIELDS))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Unwraps `quoteSummary.result[0]`, surfacing the source's own error message if any.
fn quote_summary_result(mut resp: Value) -> Result<Value> {
    let summary = resp
        .get_mut("quoteSummary")
        .map(Value::take)
        .ok_or_else(|| AppError::Fetch("response has no quoteSummary".to_string()))?;

    if let Some(err) = summary.get("error").filter(|e| !e.is_null()) {
        let description = err
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("unknown error");
        return Err(AppError::Fetch(description.to_string()));
    }

    summary
        .get("result")
        .and_then(|r| r.as_array())
        .and_then(|a| a.first())
        .cloned()
        .ok_or_else(|| AppError::Fetch("quoteSummary.result is empty".to_string()))
}

/// Numeric field that may be a bare number or a `{"raw": n, "fmt": "..."}` object.
fn raw_number(v: &Value, key: &str) -> Option<f64> {
    let field = v.get(key)?;
    field
        .get("raw")
        .and_then(|r| r.as_f64())
        .or_else(|| field.as_f64())
}

pub fn parse_snapshot(result: &Value) -> Option<FinancialSnapshot> {
    let null = Value::Null;
    let price_module = result.get("price").unwrap_or(&null);
    let financial = result.get("financialData").unwrap_or(&null);
    let key_stats = result.get("defaultKeyStatistics").unwrap_or(&null);

    let price = raw_number(financial, "currentPrice")
        .or_else(|| raw_number(price_module, "regularMarketPrice"))?;

    let company_name = price_module
        .get("shortName")
        .or_else(|| price_module.get("longName"))
        .and_then(|n| n.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Some(FinancialSnapshot {
        price: Some(price),
        company_name,
        market_cap: raw_number(price_module, "marketCap"),
        total_debt: raw_number(financial, "totalDebt"),
        total_equity: raw_number(financial, "totalStockholderEquity"),
        debt_to_equity: raw_number(financial, "debtToEquity"),
        net_income: raw_number(key_stats, "netIncomeToCommon"),
        gross_margin: raw_number(financial, "grossMargins"),
        free_cash_flow_estimate: raw_number(financial, "freeCashflow"),
    })
}

pub fn parse_statements(result: &Value) -> Statements {
    let income = statement_array(result, "incomeStatementHistory", "incomeStatementHistory");
    let balance = statement_array(result, "balanceSheetHistory", "balanceSheetStatements");
    Statements {
        income: parse_statement_table(income, INCOME_FIELDS),
        balance: parse_statement_table(balance, BALANCE_FIELDS),
    }
}

fn statement_array<'a>(result: &'a Value, module: &str, list: &str) -> &'a [Value] {
    result
        .get(module)
        .and_then(|m| m.get(list))
        .and_then(|l| l.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// One column per period, most recent first. `None` when there are no periods.
/// A line item is present when at least one period carries the field.
pub fn parse_statement_table(periods: &[Value], fields: &[(&str, LineItem)]) -> Option<StatementTable> {
    if periods.is_empty() {
        return None;
    }

    let mut ordered: Vec<&Value> = periods.iter().collect();
    ordered.sort_by(|a, b| {
        let end_a = raw_number(a, "endDate").unwrap_or(0.0);
        let end_b = raw_number(b, "endDate").unwrap_or(0.0);
        end_b.total_cmp(&end_a)
    });

    let mut table = StatementTable::new(ordered.len());
    for (key, item) in fields {
        if ordered.iter().any(|p| p.get(*key).is_some()) {
            let values = ordered.iter().map(|p| raw_number(p, key)).collect();
            table = table.with_row(*item, values);
        }
    }
    Some(table)
}

/// Logs a data-source degradation without failing the ticker.
pub fn log_degraded(ticker: &str, what: &str, err: &AppError) {
    warn!(ticker, "{what} unavailable, continuing without it: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(result: Value) -> Value {
        json!({ "quoteSummary": { "result": [result], "error": null } })
    }

    #[test]
    fn snapshot_reads_raw_fields() {
        let result = json!({
            "price": { "shortName": "Apple Inc.", "marketCap": { "raw": 3.0e12, "fmt": "3T" } },
            "financialData": {
                "currentPrice": { "raw": 190.5 },
                "totalDebt": { "raw": 1.0e11 },
                "debtToEquity": { "raw": 145.0 },
                "grossMargins": { "raw": 0.46 },
                "freeCashflow": { "raw": 9.0e10 }
            },
            "defaultKeyStatistics": { "netIncomeToCommon": { "raw": 9.7e10 } }
        });
        let snap = parse_snapshot(&result).expect("has price");
        assert_eq!(snap.price, Some(190.5));
        assert_eq!(snap.company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(snap.market_cap, Some(3.0e12));
        assert_eq!(snap.debt_to_equity, Some(145.0));
        assert_eq!(snap.net_income, Some(9.7e10));
        assert_eq!(snap.gross_margin, Some(0.46));
        assert_eq!(snap.free_cash_flow_estimate, Some(9.0e10));
        assert_eq!(snap.total_equity, None);
    }

    #[test]
    fn snapshot_without_price_is_unusable() {
        let result = json!({ "price": { "shortName": "Delisted Co" }, "financialData": {} });
        assert!(parse_snapshot(&result).is_none());
    }

    #[test]
    fn statements_are_ordered_most_recent_first() {
        let result = json!({
            "incomeStatementHistory": { "incomeStatementHistory": [
                { "endDate": { "raw": 1_600_000_000 }, "totalRevenue": { "raw": 100.0 }, "grossProfit": { "raw": 40.0 } },
                { "endDate": { "raw": 1_700_000_000 }, "totalRevenue": { "raw": 200.0 }, "grossProfit": { "raw": 90.0 } }
            ]},
            "balanceSheetHistory": { "balanceSheetStatements": [
                { "endDate": { "raw": 1_700_000_000 }, "shortLongTermDebt": { "raw": 5.0 } }
            ]}
        });
        let statements = parse_statements(&result);
        let income = statements.income.expect("income table");
        assert_eq!(income.periods(), 2);
        assert_eq!(income.get(LineItem::TotalRevenue, 0), Ok(200.0));
        assert_eq!(income.get(LineItem::GrossProfit, 1), Ok(40.0));
        assert!(!income.has(LineItem::NetIncome));

        let balance = statements.balance.expect("balance table");
        assert!(balance.has(LineItem::ShortLongTermDebt));
        assert!(!balance.has(LineItem::CurrentDebt));
    }

    #[test]
    fn missing_modules_yield_no_tables() {
        let statements = parse_statements(&json!({}));
        assert!(statements.income.is_none());
        assert!(statements.balance.is_none());
    }

    #[test]
    fn quote_summary_error_is_surfaced() {
        let resp = json!({ "quoteSummary": { "result": null, "error": { "code": "Not Found", "description": "No fundamentals data found" } } });
        let err = quote_summary_result(resp).unwrap_err();
        assert!(matches!(err, AppError::Fetch(msg) if msg.contains("No fundamentals")));

        let ok = quote_summary_result(summary(json!({ "price": {} }))).unwrap();
        assert!(ok.get("price").is_some());
    }

    // -----------------------------------------------------------------------
    // HTTP round trips against a local stub server
    // -----------------------------------------------------------------------

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use std::collections::HashMap;

    use axum::{
        extract::{Query, State},
        http::{header, HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };

    const SESSION_COOKIE: &str = "A3=session";

    /// Quote server that enforces the cookie + crumb handshake.
    #[derive(Clone)]
    struct Stub {
        hits: Arc<AtomicU32>,
        crumb_requests: Arc<AtomicU32>,
        failures: u32,
        crumb: Arc<std::sync::Mutex<String>>,
        body: Value,
    }

    impl Stub {
        fn rotate_crumb(&self, crumb: &str) {
            *self.crumb.lock().unwrap() = crumb.to_string();
        }
    }

    async fn consent() -> Response {
        let cookie = format!("{SESSION_COOKIE}; Path=/");
        (StatusCode::NOT_FOUND, [(header::SET_COOKIE, cookie)]).into_response()
    }

    async fn get_crumb(State(stub): State<Stub>, headers: HeaderMap) -> Response {
        let has_cookie = headers
            .get(header::COOKIE)
            .and_then(|c| c.to_str().ok())
            .is_some_and(|c| c.contains(SESSION_COOKIE));
        if !has_cookie {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        stub.crumb_requests.fetch_add(1, Ordering::SeqCst);
        let crumb = stub.crumb.lock().unwrap().clone();
        crumb.into_response()
    }

    async fn quote(State(stub): State<Stub>, Query(params): Query<HashMap<String, String>>) -> Response {
        let n = stub.hits.fetch_add(1, Ordering::SeqCst);
        if n < stub.failures {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        let current = stub.crumb.lock().unwrap().clone();
        if params.get("crumb") != Some(&current) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(stub.body.clone()).into_response()
    }

    /// Serves `body` after failing the first `failures` quote requests with 503.
    /// Returns the client pointed at it, plus the stub for counters and crumb rotation.
    async fn stub_server(failures: u32, body: Value) -> (YahooClient, Stub) {
        let stub = Stub {
            hits: Arc::new(AtomicU32::new(0)),
            crumb_requests: Arc::new(AtomicU32::new(0)),
            failures,
            crumb: Arc::new(std::sync::Mutex::new("abc/123".to_string())),
            body,
        };
        let app = Router::new()
            .route("/consent", get(consent))
            .route("/v1/test/getcrumb", get(get_crumb))
            .route("/v10/finance/quoteSummary/:ticker", get(quote))
            .with_state(stub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let base = format!("http://{addr}");
        let client = YahooClient::new(base.clone(), format!("{base}/consent"))
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));
        (client, stub)
    }

    fn cash_flow_body() -> Value {
        summary(json!({
            "cashflowStatementHistory": { "cashflowStatements": [
                { "endDate": { "raw": 1_700_000_000 },
                  "totalCashFromOperatingActivities": { "raw": 500.0 },
                  "capitalExpenditures": { "raw": -120.0 } }
            ]}
        }))
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let (client, stub) = stub_server(1, cash_flow_body()).await;

        let table = client.fetch_cash_flow("AAPL").await.unwrap().expect("cash flow table");
        assert_eq!(table.get(LineItem::OperatingCashFlow, 0), Ok(500.0));
        assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let (client, stub) = stub_server(u32::MAX, cash_flow_body()).await;

        assert!(client.fetch_cash_flow("AAPL").await.is_err());
        assert_eq!(stub.hits.load(Ordering::SeqCst), FETCH_ATTEMPTS);
    }

    #[tokio::test]
    async fn crumb_is_fetched_once_and_reused() {
        let (client, stub) = stub_server(0, cash_flow_body()).await;

        assert!(client.fetch_cash_flow("AAPL").await.unwrap().is_some());
        assert!(client.fetch_cash_flow("MSFT").await.unwrap().is_some());
        assert_eq!(stub.crumb_requests.load(Ordering::SeqCst), 1);
        assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_crumb_is_refreshed() {
        let (client, stub) = stub_server(0, cash_flow_body()).await;
        assert!(client.fetch_cash_flow("AAPL").await.unwrap().is_some());

        stub.rotate_crumb("rotated");
        let table = client.fetch_cash_flow("AAPL").await.unwrap().expect("cash flow table");
        assert_eq!(table.get(LineItem::CapitalExpenditure, 0), Ok(-120.0));
        assert_eq!(stub.crumb_requests.load(Ordering::SeqCst), 2);
        assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
    }
}
