pub mod ledger;
pub mod report;

pub use ledger::{LedgerError, LedgerState, RiskConfig, RiskLedger, RiskSummary, Statistics};
pub use report::{BucketStats, PerformanceReport};
