pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CacheRecord, Verdict};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Latest verdict per ticker. `upsert` replaces any prior record and stamps
/// it with the write time; no history is kept.
#[async_trait]
pub trait VerdictStore: Send + Sync {
    async fn get_latest(&self, ticker: &str) -> Result<Option<CacheRecord>>;

    async fn upsert(&self, verdict: &Verdict) -> Result<()>;
}
