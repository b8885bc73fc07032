use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quote::{BookQuote, MarketKind};

/// Coarse low/medium/high summary of profit, risk, and false-positive likelihood
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    /// One step less confident; Low stays Low
    pub fn downgraded(&self) -> Self {
        match self {
            ConfidenceLevel::High => ConfidenceLevel::Medium,
            ConfidenceLevel::Medium | ConfidenceLevel::Low => ConfidenceLevel::Low,
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Arbitrage structure: two outcomes, or three for sports with ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbitrageKind {
    TwoWay,
    ThreeWay,
}

impl ArbitrageKind {
    pub fn leg_count(&self) -> usize {
        match self {
            ArbitrageKind::TwoWay => 2,
            ArbitrageKind::ThreeWay => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArbitrageKind::TwoWay => "2-way",
            ArbitrageKind::ThreeWay => "3-way",
        }
    }
}

impl std::fmt::Display for ArbitrageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One leg of an arbitrage set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageLeg {
    pub book: String,
    pub market: MarketKind,
    pub outcome: String,
    /// Quoted American odds
    pub odds: f64,
    /// Odds after execution-cost adjustment
    pub adjusted_odds: f64,
    pub implied_prob: f64,
    pub adjusted_implied_prob: f64,
    /// Fraction of total stake on this leg (all legs sum to 1)
    pub stake_ratio: f64,
    pub stake_amount: f64,
    /// Gross payout if this leg wins
    pub expected_return: f64,
    pub available: bool,
}

/// A detected arbitrage set across books.
///
/// Immutable once built; constructed only by the detector. `profit_margin`
/// is always > 0 — a non-profitable set is never materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub kind: ArbitrageKind,
    pub game_id: String,
    pub market: MarketKind,
    /// Guaranteed return fraction: 1/Σp_adj − 1
    pub profit_margin: f64,
    /// Margin haircut for realistic fills (0.80 two-way, 0.70 three-way)
    pub expected_edge: f64,
    pub risk_adjusted_profit: f64,
    pub sharpe_ratio: f64,
    pub legs: Vec<ArbitrageLeg>,
    /// Max over legs of the weighted execution-risk blend, in [0, 1]
    pub execution_risk_score: f64,
    pub false_positive_probability: f64,
    pub confidence: ConfidenceLevel,
    pub total_stake: f64,
    pub detected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// All legs still marked available
    pub fn fully_available(&self) -> bool {
        self.legs.iter().all(|leg| leg.available)
    }

    pub fn book_names(&self) -> Vec<String> {
        self.legs.iter().map(|leg| leg.book.clone()).collect()
    }
}

/// How a cross-book discrepancy qualifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyKind {
    Arbitrage,
    Value,
}

impl DiscrepancyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::Arbitrage => "arbitrage",
            DiscrepancyKind::Value => "value",
        }
    }
}

impl std::fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Qualitative execution risk for a discrepancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Best (or worst) quote per outcome within a market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeOdds {
    pub outcome: String,
    pub book: String,
    pub american_odds: f64,
    pub implied_prob: f64,
}

impl From<(&BookQuote, f64)> for OutcomeOdds {
    fn from((quote, implied_prob): (&BookQuote, f64)) -> Self {
        Self {
            outcome: quote.outcome.clone(),
            book: quote.bookmaker.clone(),
            american_odds: quote.american_odds,
            implied_prob,
        }
    }
}

/// A single-outcome bet priced better than market consensus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueOpportunity {
    pub outcome: String,
    pub sportsbook: String,
    pub offered_odds: f64,
    /// Consensus expressed as American odds
    pub consensus_odds: f64,
    /// (consensus_prob − offered_prob) / consensus_prob
    pub implied_edge: f64,
    /// Kelly fraction of bankroll, capped at 10%
    pub suggested_stake: f64,
    pub confidence: ConfidenceLevel,
}

/// Cross-book discrepancy for one (game, market), published by the scanner.
///
/// For `kind == Arbitrage`, `opportunity` carries the detector's
/// execution-adjusted confirmation when the cross-check survived;
/// `cross_checked` is false when it did not, and arbitrage alerts are
/// refused in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDiscrepancy {
    pub game_id: String,
    pub market: MarketKind,
    pub kind: DiscrepancyKind,
    pub best_odds: Vec<OutcomeOdds>,
    pub worst_odds: Vec<OutcomeOdds>,
    /// Raw-price margin: 1/Σp_best − 1 (arbitrage kind only)
    pub arbitrage_percentage: Option<f64>,
    /// Largest spread of implied probability across books for one outcome
    pub implied_prob_spread: f64,
    pub value_score: f64,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub books_compared: Vec<String>,
    pub cross_checked: bool,
    pub opportunity: Option<ArbitrageOpportunity>,
    pub value_opportunities: Vec<ValueOpportunity>,
    pub detected_at: DateTime<Utc>,
}

impl MarketDiscrepancy {
    /// Headline number for prioritization: profit margin for arbitrage,
    /// best implied edge for value
    pub fn headline_pct(&self) -> f64 {
        match self.kind {
            DiscrepancyKind::Arbitrage => self.arbitrage_percentage.unwrap_or(0.0),
            DiscrepancyKind::Value => self
                .value_opportunities
                .iter()
                .map(|v| v.implied_edge)
                .fold(0.0, f64::max),
        }
    }
}
