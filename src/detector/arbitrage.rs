//! Arbitrage detection
//!
//! Finds two-way and three-way bet sets whose execution-adjusted implied
//! probabilities sum below 1, then scores each set for execution risk,
//! false-positive likelihood, and overall confidence:
//! 1. Adjust every leg's odds through the execution model
//! 2. Margin: `1/Σp_adj − 1`, gated on an epsilon band and a profit floor
//! 3. Stake split proportional to adjusted probability (equalized payouts)
//! 4. Risk as the max over legs (any failing leg fails the whole set)
//!
//! Every surviving opportunity is appended to the opportunity log and to a
//! bounded in-memory history.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::domain::{
    ArbitrageKind, ArbitrageLeg, ArbitrageOpportunity, BookQuote, ConfidenceLevel, Sport,
};
use crate::error::DetectError;
use crate::execution::{ExecutionModel, LiquidityTier, SportProfile};
use crate::persistence::OpportunityLog;

// =============================================================================
// Scoring constants
// =============================================================================

/// Execution-risk blend weights, per leg
const RELIABILITY_WEIGHT: f64 = 0.4;
const STAKE_WEIGHT: f64 = 0.3;
const LIQUIDITY_WEIGHT: f64 = 0.2;
const DELAY_WEIGHT: f64 = 0.1;

/// Stake/max-stake ratio saturates here in the risk blend
const STAKE_FRACTION_CAP: f64 = 0.5;

/// False-positive probability ceiling
const MAX_FALSE_POSITIVE: f64 = 0.8;

/// Per-book false-positive scaling by liquidity tier
const FP_LOW_LIQUIDITY_SCALE: f64 = 1.2;
const FP_MEDIUM_LIQUIDITY_SCALE: f64 = 1.05;

/// Three-way sets are structurally harder to fill
const THREE_WAY_RISK_SCALE: f64 = 1.15;
const THREE_WAY_FP_SCALE: f64 = 1.1;

/// Haircut applied to margin for the expected realizable edge
const TWO_WAY_EDGE_FACTOR: f64 = 0.80;
const THREE_WAY_EDGE_FACTOR: f64 = 0.70;

/// Confidence composite thresholds
const CONFIDENCE_HIGH: f64 = 0.8;
const CONFIDENCE_MEDIUM: f64 = 0.6;

/// Opportunities go stale fast; validate() refuses them after this window
const OPPORTUNITY_TTL_SECS: i64 = 300;

// =============================================================================
// Detector
// =============================================================================

/// Two-way / three-way arbitrage detector over execution-adjusted odds.
///
/// Shared across the scan loop and the verifier behind an `Arc`; the only
/// interior state is the bounded opportunity history.
pub struct ArbitrageDetector {
    execution: ExecutionModel,
    log: Arc<dyn OpportunityLog>,
    min_profit_margin: f64,
    epsilon: f64,
    min_risk_adjusted_profit: f64,
    history: RwLock<VecDeque<ArbitrageOpportunity>>,
    history_max_entries: usize,
    history_max_age: ChronoDuration,
}

impl ArbitrageDetector {
    pub fn new(
        execution: ExecutionModel,
        log: Arc<dyn OpportunityLog>,
        config: &DetectorConfig,
    ) -> Self {
        Self {
            execution,
            log,
            min_profit_margin: config.min_profit_margin,
            epsilon: config.epsilon,
            min_risk_adjusted_profit: config.min_risk_adjusted_profit,
            history: RwLock::new(VecDeque::new()),
            history_max_entries: config.history_max_entries,
            history_max_age: ChronoDuration::seconds(config.history_max_age_secs as i64),
        }
    }

    pub fn execution_model(&self) -> &ExecutionModel {
        &self.execution
    }

    /// Detect a two-way arbitrage between two quotes on opposite outcomes.
    ///
    /// Returns `Ok(None)` when no survivable margin exists; errors only on
    /// malformed input (bad odds, mixed markets).
    pub async fn detect_two_way(
        &self,
        game_id: &str,
        quote_a: &BookQuote,
        quote_b: &BookQuote,
        sport: Sport,
        total_stake: f64,
    ) -> Result<Option<ArbitrageOpportunity>, DetectError> {
        if quote_a.market != quote_b.market {
            return Err(DetectError::UnsupportedMarketShape(format!(
                "two-way legs span markets {} and {}",
                quote_a.market, quote_b.market
            )));
        }

        self.build_opportunity(
            ArbitrageKind::TwoWay,
            game_id,
            &[quote_a, quote_b],
            sport,
            total_stake,
        )
        .await
    }

    /// Detect a three-way arbitrage (home / tie / away). Only sports whose
    /// moneyline carries a tie leg support this shape.
    pub async fn detect_three_way(
        &self,
        game_id: &str,
        quotes: &[BookQuote],
        sport: Sport,
        total_stake: f64,
    ) -> Result<Option<ArbitrageOpportunity>, DetectError> {
        let profile = SportProfile::for_sport(sport);
        if !profile.supports_three_way {
            return Err(DetectError::UnsupportedMarketShape(format!(
                "{} moneylines have no tie leg",
                sport
            )));
        }
        if quotes.len() != 3 {
            return Err(DetectError::UnsupportedMarketShape(format!(
                "three-way set needs exactly 3 legs, got {}",
                quotes.len()
            )));
        }

        let refs: Vec<&BookQuote> = quotes.iter().collect();
        self.build_opportunity(ArbitrageKind::ThreeWay, game_id, &refs, sport, total_stake)
            .await
    }

    /// Re-check an opportunity before acting on it: not expired, profit
    /// still above the risk-adjusted floor, confidence above Low, every
    /// leg still marked available.
    pub fn validate(&self, opportunity: &ArbitrageOpportunity, now: DateTime<Utc>) -> bool {
        if opportunity.is_expired(now) {
            debug!(game_id = %opportunity.game_id, "opportunity expired");
            return false;
        }
        if opportunity.risk_adjusted_profit < self.min_risk_adjusted_profit {
            debug!(
                game_id = %opportunity.game_id,
                risk_adjusted = opportunity.risk_adjusted_profit,
                "risk-adjusted profit below floor"
            );
            return false;
        }
        if opportunity.confidence == ConfidenceLevel::Low {
            return false;
        }
        opportunity.fully_available()
    }

    /// Snapshot of recently detected opportunities, newest last
    pub fn recent_opportunities(&self) -> Vec<ArbitrageOpportunity> {
        match self.history.read() {
            Ok(history) => history.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    // =========================================================================
    // Core algebra, shared by both shapes
    // =========================================================================

    async fn build_opportunity(
        &self,
        kind: ArbitrageKind,
        game_id: &str,
        quotes: &[&BookQuote],
        sport: Sport,
        total_stake: f64,
    ) -> Result<Option<ArbitrageOpportunity>, DetectError> {
        let profile = SportProfile::for_sport(sport);
        let leg_count = quotes.len();
        let even_stake = total_stake / leg_count as f64;

        // Adjust every leg at the even split; the final stake allocation
        // is proportional and close enough that impact tiers match.
        let mut adjustments = Vec::with_capacity(leg_count);
        for quote in quotes {
            let adj = self
                .execution
                .adjust(quote.american_odds, &quote.bookmaker, even_stake, &profile)?;
            adjustments.push(adj);
        }

        let prob_sum: f64 = adjustments.iter().map(|a| a.adjusted_prob).sum();
        if prob_sum >= 1.0 - self.epsilon {
            debug!(
                game_id,
                %kind,
                prob_sum,
                "no arbitrage after execution adjustment"
            );
            return Ok(None);
        }

        let profit_margin = 1.0 / prob_sum - 1.0;
        if profit_margin < self.min_profit_margin {
            debug!(
                game_id,
                %kind,
                profit_margin,
                floor = self.min_profit_margin,
                "margin below detection floor"
            );
            return Ok(None);
        }

        let legs: Vec<ArbitrageLeg> = quotes
            .iter()
            .zip(&adjustments)
            .map(|(quote, adj)| {
                let stake_ratio = adj.adjusted_prob / prob_sum;
                let stake_amount = total_stake * stake_ratio;
                ArbitrageLeg {
                    book: quote.bookmaker.clone(),
                    market: quote.market,
                    outcome: quote.outcome.clone(),
                    odds: quote.american_odds,
                    adjusted_odds: adj.adjusted_odds,
                    implied_prob: adj.original_prob,
                    adjusted_implied_prob: adj.adjusted_prob,
                    stake_ratio,
                    stake_amount,
                    // Payouts equalize across legs at the adjusted price
                    expected_return: stake_amount / adj.adjusted_prob,
                    available: true,
                }
            })
            .collect();

        let mut risk = legs
            .iter()
            .map(|leg| self.leg_risk(leg))
            .fold(0.0, f64::max);
        let mut false_positive = self.false_positive_probability(profit_margin, &legs);

        if kind == ArbitrageKind::ThreeWay {
            risk = (risk * THREE_WAY_RISK_SCALE).min(1.0);
            false_positive = (false_positive * THREE_WAY_FP_SCALE).min(MAX_FALSE_POSITIVE);
        }

        let sharpe_ratio = if risk > 0.0 {
            profit_margin / risk
        } else {
            f64::INFINITY
        };

        let confidence_score = 0.4 * (profit_margin * 20.0).min(1.0)
            + 0.3 * (1.0 - risk)
            + 0.3 * (1.0 - false_positive);
        let confidence = if confidence_score >= CONFIDENCE_HIGH {
            ConfidenceLevel::High
        } else if confidence_score >= CONFIDENCE_MEDIUM {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };

        let edge_factor = match kind {
            ArbitrageKind::TwoWay => TWO_WAY_EDGE_FACTOR,
            ArbitrageKind::ThreeWay => THREE_WAY_EDGE_FACTOR,
        };

        let detected_at = Utc::now();
        let opportunity = ArbitrageOpportunity {
            kind,
            game_id: game_id.to_string(),
            market: quotes[0].market,
            profit_margin,
            expected_edge: profit_margin * edge_factor,
            risk_adjusted_profit: profit_margin * (1.0 - risk),
            sharpe_ratio,
            legs,
            execution_risk_score: risk,
            false_positive_probability: false_positive,
            confidence,
            total_stake,
            detected_at,
            expires_at: detected_at + ChronoDuration::seconds(OPPORTUNITY_TTL_SECS),
        };

        info!(
            game_id,
            kind = %opportunity.kind,
            margin_pct = format!("{:.2}", profit_margin * 100.0),
            risk = format!("{:.3}", risk),
            confidence = %opportunity.confidence,
            books = ?opportunity.book_names(),
            "arbitrage detected"
        );

        self.push_history(opportunity.clone());
        if let Err(e) = self.log.record(&opportunity).await {
            warn!(game_id, error = %e, "opportunity log write failed");
        }

        Ok(Some(opportunity))
    }

    /// Weighted execution-risk blend for one leg, in [0, 1]
    fn leg_risk(&self, leg: &ArbitrageLeg) -> f64 {
        let book = self.execution.book(&leg.book);
        let stake_fraction = if book.max_stake > 0.0 {
            (leg.stake_amount / book.max_stake).min(STAKE_FRACTION_CAP)
        } else {
            STAKE_FRACTION_CAP
        };

        book.unreliability() * RELIABILITY_WEIGHT
            + stake_fraction * STAKE_WEIGHT
            + book.liquidity.risk_weight() * LIQUIDITY_WEIGHT
            + book.delay_risk * DELAY_WEIGHT
    }

    /// Probability the detected margin is phantom (quote lag, off-market
    /// prices). Large margins are more suspicious, as are thin books.
    fn false_positive_probability(&self, profit_margin: f64, legs: &[ArbitrageLeg]) -> f64 {
        let mut fp = (2.0 * profit_margin).min(0.5) + 0.1 * (legs.len() as f64 - 2.0);

        for leg in legs {
            let book = self.execution.book(&leg.book);
            fp *= match book.liquidity {
                LiquidityTier::Low => FP_LOW_LIQUIDITY_SCALE,
                LiquidityTier::Medium => FP_MEDIUM_LIQUIDITY_SCALE,
                LiquidityTier::High => 1.0,
            };
        }

        fp.min(MAX_FALSE_POSITIVE)
    }

    fn push_history(&self, opportunity: ArbitrageOpportunity) {
        let cutoff = Utc::now() - self.history_max_age;
        if let Ok(mut history) = self.history.write() {
            history.push_back(opportunity);
            while history.len() > self.history_max_entries {
                history.pop_front();
            }
            while history
                .front()
                .map(|o| o.detected_at < cutoff)
                .unwrap_or(false)
            {
                history.pop_front();
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketKind;
    use crate::error::Result;
    use crate::persistence::{MemoryOpportunityLog, NullOpportunityLog};
    use async_trait::async_trait;

    fn detector() -> ArbitrageDetector {
        ArbitrageDetector::new(
            ExecutionModel::default(),
            Arc::new(NullOpportunityLog),
            &DetectorConfig::default(),
        )
    }

    fn quote(book: &str, outcome: &str, odds: f64) -> BookQuote {
        BookQuote::new(book, MarketKind::Moneyline, outcome, odds)
    }

    #[tokio::test]
    async fn test_two_way_basic_arbitrage() {
        // +105 / -90 across two high-liquidity books leaves a clear margin
        // even after execution costs
        let d = detector();
        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);

        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .expect("detection should not error")
            .expect("opportunity should exist");

        assert_eq!(opp.kind, ArbitrageKind::TwoWay);
        assert_eq!(opp.legs.len(), 2);
        assert!(opp.profit_margin > 0.0);
        assert!(
            matches!(
                opp.confidence,
                ConfidenceLevel::Low | ConfidenceLevel::Medium | ConfidenceLevel::High
            ),
            "confidence must be classified"
        );

        let ratio_sum: f64 = opp.legs.iter().map(|l| l.stake_ratio).sum();
        assert!((ratio_sum - 1.0).abs() < 1e-3, "ratios sum to 1: {}", ratio_sum);

        let stake_sum: f64 = opp.legs.iter().map(|l| l.stake_amount).sum();
        assert!((stake_sum - 1000.0).abs() < 1e-2, "stakes sum to total: {}", stake_sum);
    }

    #[tokio::test]
    async fn test_two_way_margin_matches_probability_sum() {
        let d = detector();
        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);

        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap()
            .unwrap();

        let prob_sum: f64 = opp.legs.iter().map(|l| l.adjusted_implied_prob).sum();
        assert!(prob_sum < 1.0 - 0.001);
        assert!((opp.profit_margin - (1.0 / prob_sum - 1.0)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_two_way_no_arbitrage_on_overround() {
        // +102 / -105 sums above 1 before adjustment even starts
        let d = detector();
        let a = quote("fanduel", "Lakers", 102.0);
        let b = quote("draftkings", "Celtics", -105.0);

        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_two_way_marginal_edge_eliminated_by_costs() {
        // Raw implied sum 0.9902 looks like an arbitrage; execution costs
        // push it past 1
        let d = detector();
        let a = quote("draftkings", "Lakers", 104.0);
        let b = quote("fanduel", "Celtics", -100.0);

        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_two_way_below_margin_floor() {
        // Survives adjustment with ~0.45% margin, under the 0.5% floor
        let d = detector();
        let a = quote("draftkings", "Lakers", 113.0);
        let b = quote("fanduel", "Celtics", -104.0);

        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap();
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn test_two_way_rejects_mixed_markets() {
        let d = detector();
        let a = quote("fanduel", "Lakers", 105.0);
        let b = BookQuote::new("draftkings", MarketKind::Spread, "Celtics", -90.0);

        let err = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::UnsupportedMarketShape(_)));
    }

    #[tokio::test]
    async fn test_two_way_invalid_odds() {
        let d = detector();
        let a = quote("fanduel", "Lakers", 0.0);
        let b = quote("draftkings", "Celtics", -90.0);

        let err = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::InvalidOdds { .. }));
    }

    #[tokio::test]
    async fn test_three_way_nfl() {
        let d = detector();
        let quotes = vec![
            quote("draftkings", "Chiefs", 250.0),
            quote("fanduel", "Tie", 320.0),
            quote("betmgm", "Bills", 180.0),
        ];

        let opp = d
            .detect_three_way("nfl-game-1", &quotes, Sport::Nfl, 1000.0)
            .await
            .expect("three-way detection should not error")
            .expect("opportunity should exist");

        assert_eq!(opp.kind, ArbitrageKind::ThreeWay);
        assert_eq!(opp.legs.len(), 3);
        assert!(opp.profit_margin > 0.0);
        assert!(
            (opp.expected_edge - opp.profit_margin * 0.70).abs() < 1e-12,
            "three-way edge haircut is 0.70"
        );

        let stake_sum: f64 = opp.legs.iter().map(|l| l.stake_amount).sum();
        assert!((stake_sum - 1000.0).abs() < 1e-2);
    }

    #[tokio::test]
    async fn test_three_way_unsupported_sport() {
        let d = detector();
        let quotes = vec![
            quote("draftkings", "Lakers", 250.0),
            quote("fanduel", "Tie", 320.0),
            quote("betmgm", "Celtics", 180.0),
        ];

        let err = d
            .detect_three_way("game-1", &quotes, Sport::Nba, 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::UnsupportedMarketShape(_)));
    }

    #[tokio::test]
    async fn test_three_way_wrong_leg_count() {
        let d = detector();
        let quotes = vec![
            quote("draftkings", "Chiefs", 250.0),
            quote("fanduel", "Bills", 180.0),
        ];

        let err = d
            .detect_three_way("nfl-game-1", &quotes, Sport::Nfl, 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::UnsupportedMarketShape(_)));
    }

    #[tokio::test]
    async fn test_two_way_expected_edge_haircut() {
        let d = detector();
        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);

        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap()
            .unwrap();
        assert!((opp.expected_edge - opp.profit_margin * 0.80).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_opportunity_recorded_to_log() {
        let log = Arc::new(MemoryOpportunityLog::new(16));
        let d = ArbitrageDetector::new(
            ExecutionModel::default(),
            log.clone(),
            &DetectorConfig::default(),
        );

        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);
        d.detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(log.len().await, 1);
    }

    struct FailingLog;

    #[async_trait]
    impl OpportunityLog for FailingLog {
        async fn record(&self, _opportunity: &ArbitrageOpportunity) -> Result<()> {
            Err(crate::error::LinewatchError::Internal(
                "log offline".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_log_failure_is_not_fatal() {
        let d = ArbitrageDetector::new(
            ExecutionModel::default(),
            Arc::new(FailingLog),
            &DetectorConfig::default(),
        );

        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);
        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .expect("log failure must not surface");
        assert!(opp.is_some());
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let config = DetectorConfig {
            history_max_entries: 2,
            ..DetectorConfig::default()
        };
        let d = ArbitrageDetector::new(
            ExecutionModel::default(),
            Arc::new(NullOpportunityLog),
            &config,
        );

        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);
        for game in ["g1", "g2", "g3"] {
            d.detect_two_way(game, &a, &b, Sport::Nba, 1000.0)
                .await
                .unwrap()
                .unwrap();
        }

        let history = d.recent_opportunities();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].game_id, "g2");
        assert_eq!(history[1].game_id, "g3");
    }

    #[tokio::test]
    async fn test_validate_rules() {
        let d = detector();
        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("draftkings", "Celtics", -90.0);
        let opp = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap()
            .unwrap();

        let now = Utc::now();
        assert!(d.validate(&opp, now));

        // expired
        assert!(!d.validate(&opp, opp.expires_at + ChronoDuration::seconds(1)));

        // leg no longer available
        let mut unavailable = opp.clone();
        unavailable.legs[0].available = false;
        assert!(!d.validate(&unavailable, now));

        // confidence collapsed
        let mut low = opp.clone();
        low.confidence = ConfidenceLevel::Low;
        assert!(!d.validate(&low, now));

        // profit no longer clears the risk-adjusted floor
        let mut thin = opp;
        thin.risk_adjusted_profit = 0.0001;
        assert!(!d.validate(&thin, now));
    }

    #[tokio::test]
    async fn test_execution_risk_uses_worst_leg() {
        // Pairing a major book with a thin fallback book must not dilute
        // risk below the thin book's own blend
        let d = detector();
        let a = quote("fanduel", "Lakers", 105.0);
        let b = quote("smallbook", "Celtics", -90.0);

        let opp_thin = d
            .detect_two_way("game-1", &a, &b, Sport::Nba, 1000.0)
            .await
            .unwrap();

        let c = quote("draftkings", "Celtics", -90.0);
        let opp_major = d
            .detect_two_way("game-1", &a, &c, Sport::Nba, 1000.0)
            .await
            .unwrap();

        // The thin-book pairing may not even survive adjustment; when it
        // does, its risk must exceed the all-major pairing
        if let (Some(thin), Some(major)) = (opp_thin, opp_major) {
            assert!(thin.execution_risk_score > major.execution_risk_score);
        }
    }
}
