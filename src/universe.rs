use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{FALLBACK_TICKERS, HTTP_TIMEOUT_SECS};
use crate::error::Result;

/// Supplies the symbols to screen.
#[async_trait]
pub trait TickerProvider: Send + Sync {
    async fn list_identifiers(&self) -> Result<Vec<String>>;
}

/// Index constituents from a CSV whose first column is the symbol.
pub struct CsvUniverse {
    client: reqwest::Client,
    url: String,
}

impl CsvUniverse {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl TickerProvider for CsvUniverse {
    async fn list_identifiers(&self) -> Result<Vec<String>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_constituents_csv(&body)
    }
}

/// A fixed list, e.g. from the TICKERS variable.
pub struct StaticUniverse(pub Vec<String>);

#[async_trait]
impl TickerProvider for StaticUniverse {
    async fn list_identifiers(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Symbols from the first CSV column, header skipped. Share-class dots become
/// dashes (`BRK.B` → `BRK-B`), which is how quote sources spell them.
pub fn parse_constituents_csv(body: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for result in reader.records() {
        let record = result?;
        let symbol = record.get(0).unwrap_or("").trim().replace('.', "-").to_ascii_uppercase();
        if !symbol.is_empty() && seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

/// Never fails: provider errors and empty listings fall back to a short fixed list.
pub async fn load_universe(provider: &dyn TickerProvider) -> Vec<String> {
    match provider.list_identifiers().await {
        Ok(tickers) if !tickers.is_empty() => {
            info!("Universe loaded: {} tickers", tickers.len());
            tickers
        }
        Ok(_) => {
            warn!("Universe provider returned no tickers, using fallback list");
            fallback_tickers()
        }
        Err(e) => {
            warn!("Universe provider failed ({e}), using fallback list");
            fallback_tickers()
        }
    }
}

fn fallback_tickers() -> Vec<String> {
    FALLBACK_TICKERS.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    struct FailingUniverse;

    #[async_trait]
    impl TickerProvider for FailingUniverse {
        async fn list_identifiers(&self) -> Result<Vec<String>> {
            Err(AppError::Fetch("connection refused".to_string()))
        }
    }

    #[test]
    fn parses_symbols_from_first_column() {
        let csv = "Symbol,Security,GICS Sector\nMMM,3M,Industrials\n\"BRK.B\",Berkshire Hathaway,Financials\n\nmmm,3M again,Industrials\n";
        assert_eq!(parse_constituents_csv(csv).unwrap(), vec!["MMM", "BRK-B"]);
    }

    #[test]
    fn quoted_multiline_field_is_one_record() {
        let csv = "Symbol,Security,Headquarters\nMMM,3M,\"Saint Paul,\nMinnesota\"\nAOS,A. O. Smith,\"Milwaukee, Wisconsin\"\n";
        assert_eq!(parse_constituents_csv(csv).unwrap(), vec!["MMM", "AOS"]);
    }

    #[tokio::test]
    async fn provider_failure_uses_fallback() {
        let tickers = load_universe(&FailingUniverse).await;
        assert_eq!(tickers, vec!["AAPL", "MSFT", "GOOG", "AMZN", "NVDA", "TSLA"]);
    }

    #[tokio::test]
    async fn empty_listing_uses_fallback() {
        let tickers = load_universe(&StaticUniverse(Vec::new())).await;
        assert_eq!(tickers.len(), FALLBACK_TICKERS.len());
    }

    #[tokio::test]
    async fn static_universe_is_used_as_is() {
        let tickers = load_universe(&StaticUniverse(vec!["KO".to_string()])).await;
        assert_eq!(tickers, vec!["KO"]);
    }
}
