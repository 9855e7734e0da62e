use serde::de::DeserializeOwned;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StockResponse {
    pub ticker: String,
    pub company_name: String,
    pub price: f64,
    pub reasons: Vec<String>,
    pub valuation: String,
    pub cash_quality: String,
    pub cash_engine_score: i64,
    pub safety_score: i64,
    pub roic: f64,
    pub fcf_yield: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SummaryResponse {
    pub total: i64,
    pub survivors: i64,
    pub rejected: i64,
    pub last_scan_finished_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthResponse {
    pub scan_in_progress: bool,
    pub universe_size: u64,
    pub analyzed: u64,
    pub cached: u64,
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// Which table the selection keys move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Survivors,
    Rejected,
}

impl Pane {
    pub fn toggle(self) -> Self {
        match self {
            Pane::Survivors => Pane::Rejected,
            Pane::Rejected => Pane::Survivors,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub summary: SummaryResponse,
    pub survivors: Vec<StockResponse>,
    pub rejected: Vec<StockResponse>,
    pub health: HealthResponse,
    pub focus: Pane,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            summary: SummaryResponse::default(),
            survivors: Vec::new(),
            rejected: Vec::new(),
            health: HealthResponse::default(),
            focus: Pane::Survivors,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Rows in the focused table.
    pub fn focused_len(&self) -> usize {
        match self.focus {
            Pane::Survivors => self.survivors.len(),
            Pane::Rejected => self.rejected.len(),
        }
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let summary_url = format!("{}/stats/summary", self.base_url);
        let survivors_url = format!("{}/stocks/survivors", self.base_url);
        let rejected_url = format!("{}/stocks/rejected", self.base_url);
        let health_url = format!("{}/health", self.base_url);

        let (summary, survivors, rejected, health) = tokio::join!(
            get_json::<SummaryResponse>(client, &summary_url),
            get_json::<Vec<StockResponse>>(client, &survivors_url),
            get_json::<Vec<StockResponse>>(client, &rejected_url),
            get_json::<HealthResponse>(client, &health_url),
        );

        match (summary, survivors, rejected) {
            (Ok(s), Ok(sv), Ok(rj)) => {
                self.summary = s;
                self.survivors = sv;
                self.rejected = rj;
                self.status = ConnectionStatus::Connected;
                if let Ok(h) = health {
                    self.health = h;
                }
            }
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.status = ConnectionStatus::Error(e);
            }
        }
    }
}

async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T, String> {
    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;
    resp.json::<T>().await.map_err(|e| format!("parse error: {e}"))
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_pct(v: f64) -> String {
    format!("{v:.1}%")
}

pub fn format_price(v: f64) -> String {
    if v > 0.0 {
        format!("${v:.2}")
    } else {
        "—".to_string()
    }
}

/// "3m ago", "5h ago", "2d ago" relative to `now_ms`.
pub fn format_age(then_ms: i64, now_ms: i64) -> String {
    let secs = (now_ms - then_ms).max(0) / 1_000;
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
