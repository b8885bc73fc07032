//! Cross-book discrepancy scanning
//!
//! Compares quotes for one (game, market) across books two ways:
//! 1. Arbitrage: best price per outcome, raw implied sum < 1. Every raw
//!    candidate is cross-checked through the execution-adjusted detector;
//!    an unconfirmed candidate is published with `cross_checked = false`
//!    and a downgraded confidence so alerting can refuse it.
//! 2. Value: robust consensus probability per outcome (2-sigma trim),
//!    flagging books priced materially below consensus.
//!
//! Raw prices only on the arbitrage side; execution-cost modeling lives in
//! the detector, not here.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use ordered_float::OrderedFloat;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::detector::ArbitrageDetector;
use crate::domain::{
    BookQuote, ConfidenceLevel, DiscrepancyKind, MarketDiscrepancy, MarketKind, OutcomeOdds,
    RiskLevel, Sport, ValueOpportunity,
};
use crate::error::{DetectError, Result};
use crate::execution::is_major_book;
use crate::feed::OddsProvider;
use crate::odds;

/// Books required before arbitrage comparison is meaningful
const MIN_BOOKS_ARBITRAGE: usize = 2;

/// Books per outcome required for a consensus
const MIN_BOOKS_VALUE: usize = 3;

/// Margins above this are a risk factor in themselves (too good to be true)
const SUSPICIOUS_MARGIN: f64 = 0.10;

/// Robust-consensus trim threshold in standard deviations
const CONSENSUS_TRIM_SIGMA: f64 = 2.0;

/// One game's scan result plus the bookkeeping counters the monitor folds
/// into its stats
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub game_id: String,
    pub discrepancies: Vec<MarketDiscrepancy>,
    pub quotes_seen: usize,
    pub stale_discarded: u64,
    pub insufficient_skips: u64,
}

/// Cross-book scanner for one configured sport.
///
/// The arbitrage detector is a required collaborator: raw-price arbitrage
/// candidates never reach alerting without its execution-adjusted
/// confirmation.
pub struct DiscrepancyScanner {
    provider: Arc<dyn OddsProvider>,
    detector: Arc<ArbitrageDetector>,
    sport: Sport,
    markets: Vec<MarketKind>,
    min_value_edge: f64,
    max_data_age_secs: u64,
    total_stake: f64,
}

impl DiscrepancyScanner {
    pub fn new(
        provider: Arc<dyn OddsProvider>,
        detector: Arc<ArbitrageDetector>,
        config: &AppConfig,
    ) -> Result<Self> {
        let sport = Sport::from_str(&config.scanner.sport)?;
        let markets = config
            .scanner
            .markets
            .iter()
            .map(|m| MarketKind::from_str(m))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            provider,
            detector,
            sport,
            markets,
            min_value_edge: config.scanner.min_value_edge,
            max_data_age_secs: config.scanner.max_data_age_secs,
            total_stake: config.detector.total_stake,
        })
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    /// Scan one game: fetch fresh quotes, discard stale ones, and run both
    /// detection passes per configured market.
    ///
    /// Per-market detection failures are recovered here; only the quote
    /// fetch itself can fail the scan.
    pub async fn scan_game(&self, game_id: &str) -> Result<ScanOutcome> {
        let quotes = self.provider.quotes(game_id, &self.markets).await?;
        let now = Utc::now();

        let mut outcome = ScanOutcome {
            game_id: game_id.to_string(),
            quotes_seen: quotes.len(),
            ..ScanOutcome::default()
        };

        let mut fresh: Vec<BookQuote> = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if quote.is_stale(now, self.max_data_age_secs) {
                let reason = DetectError::StaleSignal {
                    book: quote.bookmaker.clone(),
                    age_secs: quote.age_secs(now),
                    max_secs: self.max_data_age_secs,
                };
                debug!(game_id, %reason, "discarding quote");
                outcome.stale_discarded += 1;
            } else {
                fresh.push(quote);
            }
        }

        let mut by_market: HashMap<MarketKind, Vec<BookQuote>> = HashMap::new();
        for quote in fresh {
            by_market.entry(quote.market).or_default().push(quote);
        }

        for market in &self.markets {
            let Some(market_quotes) = by_market.get(market) else {
                continue;
            };

            match self.detect_arbitrage(game_id, *market, market_quotes).await {
                Ok(Some(discrepancy)) => outcome.discrepancies.push(discrepancy),
                Ok(None) => {}
                Err(DetectError::InsufficientBooks { .. }) => {
                    outcome.insufficient_skips += 1;
                }
                Err(e) => {
                    warn!(game_id, market = %market, error = %e, "arbitrage pass failed");
                }
            }

            match self.detect_value(game_id, *market, market_quotes) {
                Ok(Some(discrepancy)) => outcome.discrepancies.push(discrepancy),
                Ok(None) => {}
                Err(DetectError::InsufficientBooks { .. }) => {
                    outcome.insufficient_skips += 1;
                }
                Err(e) => {
                    warn!(game_id, market = %market, error = %e, "value pass failed");
                }
            }
        }

        if !outcome.discrepancies.is_empty() {
            info!(
                game_id,
                count = outcome.discrepancies.len(),
                "discrepancies found"
            );
        }
        Ok(outcome)
    }

    // =========================================================================
    // Arbitrage pass (raw prices, detector cross-check)
    // =========================================================================

    /// Raw-price arbitrage comparison over the best quote per outcome.
    pub async fn detect_arbitrage(
        &self,
        game_id: &str,
        market: MarketKind,
        quotes: &[BookQuote],
    ) -> std::result::Result<Option<MarketDiscrepancy>, DetectError> {
        let books: HashSet<&str> = quotes.iter().map(|q| q.bookmaker.as_str()).collect();
        if books.len() < MIN_BOOKS_ARBITRAGE {
            return Err(DetectError::InsufficientBooks {
                found: books.len(),
                required: MIN_BOOKS_ARBITRAGE,
            });
        }

        let groups = group_by_outcome(quotes);
        if groups.len() < 2 {
            return Ok(None);
        }
        if groups.len() > 3 {
            debug!(
                game_id,
                outcomes = groups.len(),
                "arbitrage pass limited to two- and three-outcome markets"
            );
            return Ok(None);
        }

        let best = best_per_outcome(&groups);
        let worst = worst_per_outcome(&groups);

        let raw_sum: f64 = best.iter().map(|o| o.implied_prob).sum();
        if raw_sum >= 1.0 {
            return Ok(None);
        }
        let raw_margin = 1.0 / raw_sum - 1.0;

        // Cross-check through the execution-adjusted detector; failure to
        // confirm keeps the discrepancy but flags it so alerting refuses it.
        let best_quotes: Vec<BookQuote> = best
            .iter()
            .filter_map(|o| {
                quotes
                    .iter()
                    .find(|q| q.bookmaker == o.book && q.outcome == o.outcome)
                    .cloned()
            })
            .collect();

        let confirmed = match best_quotes.len() {
            2 => {
                self.detector
                    .detect_two_way(
                        game_id,
                        &best_quotes[0],
                        &best_quotes[1],
                        self.sport,
                        self.total_stake,
                    )
                    .await?
            }
            3 => {
                match self
                    .detector
                    .detect_three_way(game_id, &best_quotes, self.sport, self.total_stake)
                    .await
                {
                    Ok(opportunity) => opportunity,
                    Err(DetectError::UnsupportedMarketShape(reason)) => {
                        debug!(game_id, reason, "three-way cross-check unsupported");
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => None,
        };

        let cross_checked = confirmed.is_some();
        let confidence = match &confirmed {
            Some(opportunity) => opportunity.confidence,
            // Unconfirmed: classify from the raw margin alone, one level down
            None => margin_confidence(raw_margin).downgraded(),
        };

        let books_compared: Vec<String> = best.iter().map(|o| o.book.clone()).collect();
        let risk_level = assess_arbitrage_risk(&books_compared, raw_margin);

        Ok(Some(MarketDiscrepancy {
            game_id: game_id.to_string(),
            market,
            kind: DiscrepancyKind::Arbitrage,
            implied_prob_spread: prob_spread(&groups),
            best_odds: best,
            worst_odds: worst,
            arbitrage_percentage: Some(raw_margin),
            value_score: 0.0,
            confidence_score: confidence_score(confidence),
            risk_level,
            books_compared,
            cross_checked,
            opportunity: confirmed,
            value_opportunities: Vec::new(),
            detected_at: Utc::now(),
        }))
    }

    // =========================================================================
    // Value pass (consensus deviation)
    // =========================================================================

    /// Find books priced materially below the robust cross-book consensus.
    pub fn detect_value(
        &self,
        game_id: &str,
        market: MarketKind,
        quotes: &[BookQuote],
    ) -> std::result::Result<Option<MarketDiscrepancy>, DetectError> {
        let groups = group_by_outcome(quotes);

        let deepest = groups.values().map(|g| g.len()).max().unwrap_or(0);
        if deepest < MIN_BOOKS_VALUE {
            return Err(DetectError::InsufficientBooks {
                found: deepest,
                required: MIN_BOOKS_VALUE,
            });
        }

        let mut value_opportunities = Vec::new();
        let mut best_score = 0.0f64;

        for (outcome_name, group) in &groups {
            if group.len() < MIN_BOOKS_VALUE {
                continue;
            }

            let probs: Vec<f64> = group.iter().map(|(_, p)| *p).collect();
            let stats = ConsensusStats::compute(&probs);
            if stats.consensus <= 0.0 {
                continue;
            }

            for (quote, own_prob) in group {
                let edge = (stats.consensus - own_prob) / stats.consensus;
                if edge <= self.min_value_edge {
                    continue;
                }

                let outlier_strength = stats.outlier_strength(*own_prob);
                let score = (edge * 10.0).min(0.4)
                    + (outlier_strength * 0.1).min(0.3)
                    + ((1.0 - stats.efficiency) * 0.3).min(0.3);
                let confidence = if score >= 0.7 {
                    ConfidenceLevel::High
                } else if score >= 0.5 {
                    ConfidenceLevel::Medium
                } else {
                    ConfidenceLevel::Low
                };
                if confidence == ConfidenceLevel::Low {
                    continue;
                }

                let consensus_odds = odds::implied_to_american(stats.consensus)?;
                let suggested_stake = odds::kelly_stake(edge, quote.american_odds)?;

                debug!(
                    game_id,
                    outcome = %outcome_name,
                    book = %quote.bookmaker,
                    edge = format!("{:.3}", edge),
                    "value edge found"
                );

                best_score = best_score.max(score);
                value_opportunities.push(ValueOpportunity {
                    outcome: outcome_name.clone(),
                    sportsbook: quote.bookmaker.clone(),
                    offered_odds: quote.american_odds,
                    consensus_odds,
                    implied_edge: edge,
                    suggested_stake,
                    confidence,
                });
            }
        }

        if value_opportunities.is_empty() {
            return Ok(None);
        }

        let books_compared: Vec<String> = {
            let mut books: Vec<String> = quotes
                .iter()
                .map(|q| q.bookmaker.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            books.sort();
            books
        };
        let risk_level = assess_arbitrage_risk(&books_compared, 0.0);
        let value_score = value_opportunities
            .iter()
            .map(|v| v.implied_edge)
            .fold(0.0, f64::max);

        Ok(Some(MarketDiscrepancy {
            game_id: game_id.to_string(),
            market,
            kind: DiscrepancyKind::Value,
            implied_prob_spread: prob_spread(&groups),
            best_odds: best_per_outcome(&groups),
            worst_odds: worst_per_outcome(&groups),
            arbitrage_percentage: None,
            value_score,
            confidence_score: best_score,
            risk_level,
            books_compared,
            // Value discrepancies never pass through the detector; the
            // cross-check gate applies to arbitrage alerts only
            cross_checked: true,
            opportunity: None,
            value_opportunities,
            detected_at: Utc::now(),
        }))
    }
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Group quotes by outcome with each quote's implied probability.
/// Quotes with malformed odds are rejected locally, not fatally.
fn group_by_outcome(quotes: &[BookQuote]) -> BTreeMap<String, Vec<(&BookQuote, f64)>> {
    let mut groups: BTreeMap<String, Vec<(&BookQuote, f64)>> = BTreeMap::new();
    for quote in quotes {
        match odds::american_to_implied(quote.american_odds) {
            Ok(prob) => groups
                .entry(quote.outcome.clone())
                .or_default()
                .push((quote, prob)),
            Err(e) => {
                debug!(book = %quote.bookmaker, error = %e, "rejecting malformed quote");
            }
        }
    }
    groups
}

/// Bettor-best quote per outcome: the lowest implied probability
fn best_per_outcome(groups: &BTreeMap<String, Vec<(&BookQuote, f64)>>) -> Vec<OutcomeOdds> {
    groups
        .values()
        .filter_map(|group| {
            group
                .iter()
                .min_by_key(|(_, prob)| OrderedFloat(*prob))
                .map(|(quote, prob)| OutcomeOdds::from((*quote, *prob)))
        })
        .collect()
}

fn worst_per_outcome(groups: &BTreeMap<String, Vec<(&BookQuote, f64)>>) -> Vec<OutcomeOdds> {
    groups
        .values()
        .filter_map(|group| {
            group
                .iter()
                .max_by_key(|(_, prob)| OrderedFloat(*prob))
                .map(|(quote, prob)| OutcomeOdds::from((*quote, *prob)))
        })
        .collect()
}

/// Largest cross-book implied-probability spread over any single outcome
fn prob_spread(groups: &BTreeMap<String, Vec<(&BookQuote, f64)>>) -> f64 {
    groups
        .values()
        .filter_map(|group| {
            let min = group.iter().map(|(_, p)| *p).fold(f64::INFINITY, f64::min);
            let max = group
                .iter()
                .map(|(_, p)| *p)
                .fold(f64::NEG_INFINITY, f64::max);
            (group.len() > 1).then_some(max - min)
        })
        .fold(0.0, f64::max)
}

/// Risk factors: thin book coverage, no major book, suspiciously large margin
fn assess_arbitrage_risk(books: &[String], margin: f64) -> RiskLevel {
    let distinct: HashSet<&str> = books.iter().map(|b| b.as_str()).collect();

    let mut factors = 0;
    if distinct.len() <= 2 {
        factors += 1;
    }
    if !distinct.iter().any(|b| is_major_book(b)) {
        factors += 1;
    }
    if margin > SUSPICIOUS_MARGIN {
        factors += 1;
    }

    match factors {
        0 => RiskLevel::Low,
        1 | 2 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// Classify a raw margin the way the detector's composite would lean,
/// used only when no execution-adjusted confirmation exists
fn margin_confidence(margin: f64) -> ConfidenceLevel {
    let score = (margin * 20.0).min(1.0);
    if score >= 0.8 {
        ConfidenceLevel::High
    } else if score >= 0.6 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

fn confidence_score(level: ConfidenceLevel) -> f64 {
    match level {
        ConfidenceLevel::High => 0.9,
        ConfidenceLevel::Medium => 0.7,
        ConfidenceLevel::Low => 0.4,
    }
}

/// Consensus statistics over one outcome's implied probabilities.
///
/// `consensus` is the mean after dropping points farther than 2 sigma from
/// the raw mean (only attempted when more than two points exist);
/// `efficiency` is the coefficient of variation of the raw set, capped at 1.
#[derive(Debug, Clone, Copy)]
struct ConsensusStats {
    mean: f64,
    std_dev: f64,
    consensus: f64,
    efficiency: f64,
}

impl ConsensusStats {
    fn compute(probs: &[f64]) -> Self {
        let n = probs.len() as f64;
        let mean = probs.iter().sum::<f64>() / n;
        let variance = probs.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        let consensus = if probs.len() > 2 && std_dev > 0.0 {
            let kept: Vec<f64> = probs
                .iter()
                .copied()
                .filter(|p| ((p - mean) / std_dev).abs() <= CONSENSUS_TRIM_SIGMA)
                .collect();
            if kept.is_empty() {
                mean
            } else {
                kept.iter().sum::<f64>() / kept.len() as f64
            }
        } else {
            mean
        };

        let efficiency = if mean > 0.0 {
            (std_dev / mean).min(1.0)
        } else {
            1.0
        };

        Self {
            mean,
            std_dev,
            consensus,
            efficiency,
        }
    }

    /// Standardized deviation from the raw mean; zero when the books agree
    fn outlier_strength(&self, value: f64) -> f64 {
        if self.std_dev > 0.0 {
            (value - self.mean).abs() / self.std_dev
        } else {
            0.0
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
