//! Detection layer: execution-adjusted arbitrage plus cross-book
//! discrepancy scanning

mod arbitrage;
mod discrepancy;

pub use arbitrage::ArbitrageDetector;
pub use discrepancy::{DiscrepancyScanner, ScanOutcome};
