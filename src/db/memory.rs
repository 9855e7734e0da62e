use async_trait::async_trait;
use dashmap::DashMap;

use crate::db::VerdictStore;
use crate::error::Result;
use crate::types::{now_ms, CacheRecord, Verdict};

/// Process-local verdict store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, CacheRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Seeds a record with an explicit timestamp.
    #[cfg(test)]
    pub fn insert_record(&self, record: CacheRecord) {
        self.records.insert(record.verdict.ticker.clone(), record);
    }
}

#[async_trait]
impl VerdictStore for MemoryStore {
    async fn get_latest(&self, ticker: &str) -> Result<Option<CacheRecord>> {
        Ok(self.records.get(ticker).map(|r| r.value().clone()))
    }

    async fn upsert(&self, verdict: &Verdict) -> Result<()> {
        self.records.insert(
            verdict.ticker.clone(),
            CacheRecord {
                verdict: verdict.clone(),
                updated_at_ms: now_ms(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::sample_verdict;
    use crate::types::Status;

    #[tokio::test]
    async fn keeps_one_record_per_ticker() {
        let store = MemoryStore::new();
        store.upsert(&sample_verdict("MSFT", Status::Rejected, 20.0)).await.unwrap();
        store.upsert(&sample_verdict("MSFT", Status::Survivor, 30.0)).await.unwrap();

        assert_eq!(store.len(), 1);
        let record = store.get_latest("MSFT").await.unwrap().unwrap();
        assert_eq!(record.verdict.status, Status::Survivor);
        assert!(store.get_latest("AAPL").await.unwrap().is_none());
    }
}
