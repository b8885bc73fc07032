//! Discrepancy-to-alert conversion
//!
//! Applies the alerting-level profit filter on top of the detector's
//! floor, derives priority and expiry from the discrepancy, and renders
//! the human-readable headline. Arbitrage discrepancies that failed the
//! detector cross-check are refused outright.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AlertsConfig;
use crate::domain::{
    Alert, AlertKind, AlertPayload, AlertPriority, DiscrepancyKind, MarketDiscrepancy,
    TimeSensitivity, ValueOpportunity,
};

/// Arbitrage priority bands over profit margin
const ARBITRAGE_CRITICAL: f64 = 0.05;
const ARBITRAGE_HIGH: f64 = 0.03;

/// Value priority bands over implied edge
const VALUE_HIGH: f64 = 0.10;
const VALUE_MEDIUM: f64 = 0.07;

pub struct AlertFactory {
    min_arbitrage_profit: f64,
    arbitrage_expiry: ChronoDuration,
    value_expiry: ChronoDuration,
}

impl AlertFactory {
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            min_arbitrage_profit: config.min_arbitrage_profit,
            arbitrage_expiry: ChronoDuration::seconds(config.arbitrage_expiry_secs as i64),
            value_expiry: ChronoDuration::seconds(config.value_expiry_secs as i64),
        }
    }

    /// Convert a discrepancy into an alert, or decline with `None`.
    ///
    /// Declines are routine: sub-threshold margins stay in the opportunity
    /// log without alerting, and unconfirmed arbitrage never alerts.
    pub fn build(&self, discrepancy: &MarketDiscrepancy) -> Option<Alert> {
        match discrepancy.kind {
            DiscrepancyKind::Arbitrage => self.build_arbitrage(discrepancy),
            DiscrepancyKind::Value => self.build_value(discrepancy),
        }
    }

    fn build_arbitrage(&self, discrepancy: &MarketDiscrepancy) -> Option<Alert> {
        if !discrepancy.cross_checked {
            warn!(
                game_id = %discrepancy.game_id,
                market = %discrepancy.market,
                "refusing arbitrage alert without execution-adjusted confirmation"
            );
            return None;
        }
        let opportunity = discrepancy.opportunity.as_ref()?;

        // Alerting threshold is layered on top of the detector's floor;
        // opportunities between the two stay logged but silent
        if opportunity.profit_margin < self.min_arbitrage_profit {
            debug!(
                game_id = %discrepancy.game_id,
                margin_pct = format!("{:.2}", opportunity.profit_margin * 100.0),
                threshold_pct = format!("{:.2}", self.min_arbitrage_profit * 100.0),
                "margin below alerting threshold"
            );
            return None;
        }

        let priority = if opportunity.profit_margin >= ARBITRAGE_CRITICAL {
            AlertPriority::Critical
        } else if opportunity.profit_margin >= ARBITRAGE_HIGH {
            AlertPriority::High
        } else {
            AlertPriority::Medium
        };

        let books = opportunity.book_names().join("/");
        let message = format!(
            "{} {} arbitrage on {} {}: {:.2}% margin across {} (confidence: {})",
            priority.emoji(),
            opportunity.kind,
            discrepancy.game_id,
            discrepancy.market,
            opportunity.profit_margin * 100.0,
            books,
            opportunity.confidence,
        );

        let created_at = Utc::now();
        Some(Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::Arbitrage,
            priority,
            game_id: discrepancy.game_id.clone(),
            market: discrepancy.market,
            confidence: opportunity.confidence,
            profit_potential: opportunity.profit_margin,
            payload: AlertPayload::Arbitrage(opportunity.clone()),
            time_sensitivity: TimeSensitivity::Immediate,
            message,
            created_at,
            expires_at: created_at + self.arbitrage_expiry,
            acknowledged: false,
        })
    }

    fn build_value(&self, discrepancy: &MarketDiscrepancy) -> Option<Alert> {
        // Strongest edge leads; the rest ride along in the payload
        let mut sorted: Vec<ValueOpportunity> = discrepancy.value_opportunities.clone();
        sorted.sort_by(|a, b| {
            b.implied_edge
                .partial_cmp(&a.implied_edge)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut iter = sorted.into_iter();
        let primary = iter.next()?;
        let additional: Vec<ValueOpportunity> = iter.collect();

        let priority = if primary.implied_edge >= VALUE_HIGH {
            AlertPriority::High
        } else if primary.implied_edge >= VALUE_MEDIUM {
            AlertPriority::Medium
        } else {
            AlertPriority::Low
        };

        let message = format!(
            "{} Value edge on {} {}: {} {} at {:+.0} vs consensus {:+.0} ({:.1}% edge)",
            priority.emoji(),
            discrepancy.game_id,
            discrepancy.market,
            primary.sportsbook,
            primary.outcome,
            primary.offered_odds,
            primary.consensus_odds,
            primary.implied_edge * 100.0,
        );

        let created_at = Utc::now();
        Some(Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::Value,
            priority,
            game_id: discrepancy.game_id.clone(),
            market: discrepancy.market,
            confidence: primary.confidence,
            profit_potential: primary.implied_edge,
            payload: AlertPayload::Value {
                primary,
                additional,
            },
            time_sensitivity: TimeSensitivity::Short,
            message,
            created_at,
            expires_at: created_at + self.value_expiry,
            acknowledged: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ArbitrageKind, ArbitrageLeg, ArbitrageOpportunity, ConfidenceLevel, MarketKind, RiskLevel,
    };

    fn opportunity(margin: f64) -> ArbitrageOpportunity {
        let now = Utc::now();
        ArbitrageOpportunity {
            kind: ArbitrageKind::TwoWay,
            game_id: "game-1".to_string(),
            market: MarketKind::Moneyline,
            profit_margin: margin,
            expected_edge: margin * 0.80,
            risk_adjusted_profit: margin * 0.95,
            sharpe_ratio: 1.0,
            legs: vec![
                leg("fanduel", "Lakers", 105.0),
                leg("draftkings", "Celtics", -90.0),
            ],
            execution_risk_score: 0.05,
            false_positive_probability: 0.05,
            confidence: ConfidenceLevel::Medium,
            total_stake: 1000.0,
            detected_at: now,
            expires_at: now + ChronoDuration::seconds(300),
        }
    }

    fn leg(book: &str, outcome: &str, odds: f64) -> ArbitrageLeg {
        ArbitrageLeg {
            book: book.to_string(),
            market: MarketKind::Moneyline,
            outcome: outcome.to_string(),
            odds,
            adjusted_odds: odds - 5.0,
            implied_prob: 0.49,
            adjusted_implied_prob: 0.50,
            stake_ratio: 0.5,
            stake_amount: 500.0,
            expected_return: 1020.0,
            available: true,
        }
    }

    fn arbitrage_discrepancy(margin: f64, cross_checked: bool) -> MarketDiscrepancy {
        MarketDiscrepancy {
            game_id: "game-1".to_string(),
            market: MarketKind::Moneyline,
            kind: DiscrepancyKind::Arbitrage,
            best_odds: Vec::new(),
            worst_odds: Vec::new(),
            arbitrage_percentage: Some(margin),
            implied_prob_spread: 0.01,
            value_score: 0.0,
            confidence_score: 0.7,
            risk_level: RiskLevel::Medium,
            books_compared: vec!["fanduel".to_string(), "draftkings".to_string()],
            cross_checked,
            opportunity: cross_checked.then(|| opportunity(margin)),
            value_opportunities: Vec::new(),
            detected_at: Utc::now(),
        }
    }

    fn value_discrepancy(edges: &[f64]) -> MarketDiscrepancy {
        let value_opportunities = edges
            .iter()
            .enumerate()
            .map(|(i, edge)| ValueOpportunity {
                outcome: "Lakers".to_string(),
                sportsbook: format!("book{}", i),
                offered_odds: 130.0,
                consensus_odds: -100.0,
                implied_edge: *edge,
                suggested_stake: 0.05,
                confidence: ConfidenceLevel::Medium,
            })
            .collect();

        MarketDiscrepancy {
            game_id: "game-1".to_string(),
            market: MarketKind::Moneyline,
            kind: DiscrepancyKind::Value,
            best_odds: Vec::new(),
            worst_odds: Vec::new(),
            arbitrage_percentage: None,
            implied_prob_spread: 0.02,
            value_score: edges.iter().copied().fold(0.0, f64::max),
            confidence_score: 0.6,
            risk_level: RiskLevel::Medium,
            books_compared: vec!["fanduel".to_string()],
            cross_checked: true,
            opportunity: None,
            value_opportunities,
            detected_at: Utc::now(),
        }
    }

    fn factory() -> AlertFactory {
        AlertFactory::new(&AlertsConfig::default())
    }

    #[test]
    fn test_arbitrage_priority_bands() {
        let f = factory();

        let critical = f.build(&arbitrage_discrepancy(0.06, true)).unwrap();
        assert_eq!(critical.priority, AlertPriority::Critical);

        let high = f.build(&arbitrage_discrepancy(0.035, true)).unwrap();
        assert_eq!(high.priority, AlertPriority::High);

        let medium = f.build(&arbitrage_discrepancy(0.025, true)).unwrap();
        assert_eq!(medium.priority, AlertPriority::Medium);
    }

    #[test]
    fn test_arbitrage_below_alert_threshold() {
        // 1.5% clears the detector floor but not the alerting threshold
        let f = factory();
        assert!(f.build(&arbitrage_discrepancy(0.015, true)).is_none());
    }

    #[test]
    fn test_arbitrage_requires_cross_check() {
        let f = factory();
        assert!(f.build(&arbitrage_discrepancy(0.06, false)).is_none());
    }

    #[test]
    fn test_arbitrage_expiry_and_sensitivity() {
        let f = factory();
        let alert = f.build(&arbitrage_discrepancy(0.04, true)).unwrap();

        assert_eq!(alert.time_sensitivity, TimeSensitivity::Immediate);
        assert_eq!((alert.expires_at - alert.created_at).num_seconds(), 600);
        assert_eq!(alert.kind, AlertKind::Arbitrage);
        assert!(alert.message.contains("game-1"));
        assert!(alert.message.contains("moneyline"));
    }

    #[test]
    fn test_value_priority_bands() {
        let f = factory();

        let high = f.build(&value_discrepancy(&[0.12])).unwrap();
        assert_eq!(high.priority, AlertPriority::High);

        let medium = f.build(&value_discrepancy(&[0.08])).unwrap();
        assert_eq!(medium.priority, AlertPriority::Medium);

        let low = f.build(&value_discrepancy(&[0.06])).unwrap();
        assert_eq!(low.priority, AlertPriority::Low);
    }

    #[test]
    fn test_value_primary_is_best_edge() {
        let f = factory();
        let alert = f.build(&value_discrepancy(&[0.06, 0.11, 0.08])).unwrap();

        assert_eq!(alert.priority, AlertPriority::High);
        assert!((alert.profit_potential - 0.11).abs() < 1e-12);
        match &alert.payload {
            AlertPayload::Value {
                primary,
                additional,
            } => {
                assert!((primary.implied_edge - 0.11).abs() < 1e-12);
                assert_eq!(additional.len(), 2);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_value_expiry() {
        let f = factory();
        let alert = f.build(&value_discrepancy(&[0.08])).unwrap();
        assert_eq!(alert.time_sensitivity, TimeSensitivity::Short);
        assert_eq!((alert.expires_at - alert.created_at).num_seconds(), 1800);
    }

    #[test]
    fn test_empty_value_discrepancy_declines() {
        let f = factory();
        assert!(f.build(&value_discrepancy(&[])).is_none());
    }
}
