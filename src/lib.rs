pub mod adapters;
pub mod alerts;
pub mod cli;
pub mod config;
pub mod detector;
pub mod domain;
pub mod error;
pub mod execution;
pub mod feed;
pub mod monitor;
pub mod odds;
pub mod persistence;
pub mod services;
pub mod verifier;

pub use alerts::{build_sinks, dispatch_all, AlertFactory, AlertSink, LogAlertSink};
pub use config::AppConfig;
pub use detector::{ArbitrageDetector, DiscrepancyScanner, ScanOutcome};
pub use domain::{
    Alert, AlertKind, AlertPriority, AlertStatus, ArbitrageOpportunity, BookQuote,
    ConfidenceLevel, DiscrepancyKind, MarketDiscrepancy, MarketKind, RiskLevel, Sport,
    ValueOpportunity, VerificationOutcome, VerificationReport,
};
pub use error::{LinewatchError, Result};
pub use execution::ExecutionModel;
pub use feed::{build_provider, OddsProvider};
pub use monitor::{ActiveAlert, Monitor, MonitorStats};
pub use persistence::{
    JsonlOpportunityLog, MemoryOpportunityLog, NullOpportunityLog, OpportunityLog,
};
pub use services::{AppState, HealthServer, Metrics};
pub use verifier::FinalVerifier;
