use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::opportunity::{ArbitrageOpportunity, ConfidenceLevel, ValueOpportunity};
use super::quote::MarketKind;

/// What kind of opportunity an alert carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Arbitrage,
    Value,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Arbitrage => "arbitrage",
            AlertKind::Value => "value",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    /// Get emoji prefix for alert priority
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertPriority::Low => "\u{1f4cb}",      // clipboard
            AlertPriority::Medium => "\u{2139}\u{fe0f}", // info icon
            AlertPriority::High => "\u{26a0}\u{fe0f}",   // warning icon
            AlertPriority::Critical => "\u{1f6a8}", // police light
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
            AlertPriority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertPriority {
    type Err = crate::error::LinewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(AlertPriority::Low),
            "medium" => Ok(AlertPriority::Medium),
            "high" => Ok(AlertPriority::High),
            "critical" => Ok(AlertPriority::Critical),
            other => Err(crate::error::LinewatchError::Validation(format!(
                "Unknown alert priority: {}",
                other
            ))),
        }
    }
}

/// How quickly the opportunity decays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSensitivity {
    /// Minutes — arbitrage windows close fast
    Immediate,
    /// Tens of minutes — consensus mispricing drifts back slowly
    Short,
}

impl TimeSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSensitivity::Immediate => "immediate",
            TimeSensitivity::Short => "short",
        }
    }
}

/// Cooldown/dedup key: at most one active alert per key at a time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    pub game_id: String,
    pub market: MarketKind,
    pub kind: AlertKind,
}

impl AlertKey {
    pub fn new(game_id: &str, market: MarketKind, kind: AlertKind) -> Self {
        Self {
            game_id: game_id.to_string(),
            market,
            kind,
        }
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.game_id, self.market, self.kind)
    }
}

/// Opportunity data carried by an alert, used again at verification time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AlertPayload {
    Arbitrage(ArbitrageOpportunity),
    Value {
        primary: ValueOpportunity,
        additional: Vec<ValueOpportunity>,
    },
}

/// A prioritized, time-bounded alert built from a market discrepancy.
///
/// Immutable after construction except `acknowledged`, which the monitor
/// flips in its own active-alert table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub game_id: String,
    pub market: MarketKind,
    pub payload: AlertPayload,
    pub confidence: ConfidenceLevel,
    /// Profit margin (arbitrage) or implied edge (value), as a fraction
    pub profit_potential: f64,
    pub time_sensitivity: TimeSensitivity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(&self.game_id, self.market, self.kind)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds until expiry (never negative)
    pub fn ttl_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Terminal and intermediate alert states tracked by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Accepted into the queue, not yet verified
    Pending,
    Dispatched,
    Cancelled,
    Expired,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlertStatus::Dispatched | AlertStatus::Cancelled | AlertStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Dispatched => "dispatched",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::Expired => "expired",
        }
    }
}

/// Outcome of the pre-dispatch verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Valid,
    MarketUnavailable,
    OddsShifted,
    StaleData,
    Error,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Valid => "valid",
            VerificationOutcome::MarketUnavailable => "market_unavailable",
            VerificationOutcome::OddsShifted => "odds_shifted",
            VerificationOutcome::StaleData => "stale_data",
            VerificationOutcome::Error => "error",
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-leg comparison of expected vs freshly fetched odds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsComparison {
    pub outcome: String,
    pub book: String,
    pub expected_odds: f64,
    pub current_odds: Option<f64>,
    /// Absolute change in American points
    pub odds_shift: f64,
    /// Absolute change in implied probability
    pub prob_shift: f64,
    /// Relative change of implied probability
    pub shift_pct: f64,
    pub available: bool,
}

/// Result of the final pre-dispatch check, created exactly once per alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub alert_id: Uuid,
    pub outcome: VerificationOutcome,
    pub comparisons: Vec<OddsComparison>,
    pub should_dispatch: bool,
    pub cancellation_reason: Option<String>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    /// Fraction of expected legs still quoted
    pub fn available_fraction(&self) -> f64 {
        if self.comparisons.is_empty() {
            return 0.0;
        }
        let available = self.comparisons.iter().filter(|c| c.available).count();
        available as f64 / self.comparisons.len() as f64
    }
}
