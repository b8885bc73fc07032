//! Append-only opportunity log
//!
//! Every detected opportunity is recorded through the [`OpportunityLog`]
//! trait, regardless of whether it later clears the alerting filters. The
//! log is a sink: failures are reported to the caller but detection treats
//! them as non-fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::{ArbitrageKind, ArbitrageOpportunity, MarketKind};
use crate::error::Result;

/// One line in the log, flattened for downstream analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub game_id: String,
    pub market: MarketKind,
    pub kind: ArbitrageKind,
    pub profit_margin: f64,
    pub expected_edge: f64,
    pub execution_risk_score: f64,
    pub confidence: String,
    pub books: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl From<&ArbitrageOpportunity> for OpportunityRecord {
    fn from(opp: &ArbitrageOpportunity) -> Self {
        Self {
            game_id: opp.game_id.clone(),
            market: opp.market,
            kind: opp.kind,
            profit_margin: opp.profit_margin,
            expected_edge: opp.expected_edge,
            execution_risk_score: opp.execution_risk_score,
            confidence: opp.confidence.to_string(),
            books: opp.book_names(),
            detected_at: opp.detected_at,
        }
    }
}

/// Append-only sink for detected opportunities
#[async_trait]
pub trait OpportunityLog: Send + Sync {
    async fn record(&self, opportunity: &ArbitrageOpportunity) -> Result<()>;
}

/// Discards everything; used when logging is disabled
#[derive(Debug, Default)]
pub struct NullOpportunityLog;

#[async_trait]
impl OpportunityLog for NullOpportunityLog {
    async fn record(&self, _opportunity: &ArbitrageOpportunity) -> Result<()> {
        Ok(())
    }
}

/// Bounded in-memory log; oldest entries drop first
#[derive(Debug)]
pub struct MemoryOpportunityLog {
    entries: RwLock<VecDeque<OpportunityRecord>>,
    max_entries: usize,
}

impl MemoryOpportunityLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(256))),
            max_entries,
        }
    }

    pub async fn snapshot(&self) -> Vec<OpportunityRecord> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl OpportunityLog for MemoryOpportunityLog {
    async fn record(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(OpportunityRecord::from(opportunity));
        Ok(())
    }
}

/// Newline-delimited JSON file appender
pub struct JsonlOpportunityLog {
    path: PathBuf,
    // Serializes appends so concurrent records cannot interleave
    writer: Mutex<()>,
}

impl JsonlOpportunityLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }
}

#[async_trait]
impl OpportunityLog for JsonlOpportunityLog {
    async fn record(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        let record = OpportunityRecord::from(opportunity);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        debug!(
            game_id = %record.game_id,
            margin = record.profit_margin,
            "Opportunity appended to {}",
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConfidenceLevel;

    fn sample_opportunity(game_id: &str) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            kind: ArbitrageKind::TwoWay,
            game_id: game_id.to_string(),
            market: MarketKind::Moneyline,
            profit_margin: 0.03,
            expected_edge: 0.024,
            risk_adjusted_profit: 0.025,
            sharpe_ratio: 0.2,
            legs: Vec::new(),
            execution_risk_score: 0.15,
            false_positive_probability: 0.1,
            confidence: ConfidenceLevel::High,
            total_stake: 1000.0,
            detected_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
        }
    }

    #[tokio::test]
    async fn test_memory_log_bounded() {
        let log = MemoryOpportunityLog::new(3);
        for i in 0..5 {
            log.record(&sample_opportunity(&format!("game-{}", i)))
                .await
                .unwrap();
        }
        let entries = log.snapshot().await;
        assert_eq!(entries.len(), 3);
        // Oldest two were evicted
        assert_eq!(entries[0].game_id, "game-2");
        assert_eq!(entries[2].game_id, "game-4");
    }

    #[tokio::test]
    async fn test_jsonl_log_appends_lines() {
        let dir = std::env::temp_dir().join(format!("linewatch-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("opportunities.jsonl");

        let log = JsonlOpportunityLog::new(&path);
        log.record(&sample_opportunity("g1")).await.unwrap();
        log.record(&sample_opportunity("g2")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: OpportunityRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.game_id, "g1");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_null_log_accepts_everything() {
        let log = NullOpportunityLog;
        assert!(log.record(&sample_opportunity("g")).await.is_ok());
    }
}
