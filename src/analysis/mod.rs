pub mod cash_quality;
pub mod freshness;
pub mod history;
pub mod metrics;
pub mod sanitize;
pub mod table;
pub mod verdict;

pub use freshness::{Freshness, FreshnessGate};
pub use verdict::VerdictEngine;
