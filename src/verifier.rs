//! Final pre-dispatch verification
//!
//! The last gate before an alert leaves the process: re-fetch the market,
//! compare current odds against what the alert was built on, and cancel
//! when the window has moved or closed. Arbitrage and critical alerts get
//! tighter shift tolerances than the defaults.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ordered_float::OrderedFloat;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::VerificationConfig;
use crate::domain::{
    Alert, AlertKey, AlertKind, AlertPayload, AlertPriority, BookQuote, MarketKind,
    OddsComparison, VerificationOutcome, VerificationReport,
};
use crate::error::{LinewatchError, Result};
use crate::feed::OddsProvider;
use crate::odds;

/// Critical alerts tolerate half the configured shift
const CRITICAL_THRESHOLD_SCALE: f64 = 0.5;
/// Arbitrage margins die on small moves; tolerate ~30% of the configured shift
const ARBITRAGE_THRESHOLD_SCALE: f64 = 0.3;
const RETRY_JITTER_MS: u64 = 250;

/// Scaled shift tolerances for one alert
struct ShiftLimits {
    odds: f64,
    prob: f64,
    pct: f64,
}

struct ExpectedLeg {
    book: String,
    outcome: String,
    odds: f64,
}

struct CachedReport {
    report: VerificationReport,
    cached_at: DateTime<Utc>,
}

impl CachedReport {
    fn is_expired(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        (now - self.cached_at).num_seconds() >= ttl_secs as i64
    }
}

pub struct FinalVerifier {
    provider: Arc<dyn OddsProvider>,
    config: VerificationConfig,
    report_cache: DashMap<AlertKey, CachedReport>,
}

impl FinalVerifier {
    pub fn new(provider: Arc<dyn OddsProvider>, config: VerificationConfig) -> Self {
        Self {
            provider,
            config,
            report_cache: DashMap::new(),
        }
    }

    /// Re-check an alert against live quotes and decide dispatch.
    ///
    /// Always produces a report; fetch failures and expiry fold into
    /// cancelling outcomes rather than errors.
    pub async fn verify(&self, alert: &Alert) -> VerificationReport {
        let now = Utc::now();
        if alert.is_expired(now) {
            warn!(alert_id = %alert.id, "alert expired before verification");
            return self.expired_report(alert);
        }

        let key = alert.key();
        if let Some(entry) = self.report_cache.get(&key) {
            if !entry.is_expired(now, self.config.report_cache_ttl_secs) {
                debug!(key = %key, "verification served from report cache");
                let mut report = entry.report.clone();
                report.alert_id = alert.id;
                if report.outcome == VerificationOutcome::Error {
                    report.should_dispatch = self.dispatch_despite_error(alert.priority);
                }
                return report;
            }
        }
        self.report_cache
            .retain(|_, entry| !entry.is_expired(now, self.config.report_cache_ttl_secs));

        let quotes = match self.fetch_quotes(&alert.game_id, alert.market).await {
            Ok(quotes) => quotes,
            Err(LinewatchError::MarketDataUnavailable(reason)) => {
                return self.finish(
                    alert,
                    &key,
                    VerificationOutcome::MarketUnavailable,
                    unavailable_comparisons(alert),
                    false,
                    Some(format!("market gone: {}", reason)),
                );
            }
            Err(err) => {
                let should_dispatch = self.dispatch_despite_error(alert.priority);
                return self.finish(
                    alert,
                    &key,
                    VerificationOutcome::Error,
                    unavailable_comparisons(alert),
                    should_dispatch,
                    Some(err.to_string()),
                );
            }
        };

        // The fetch may have burned through the alert's remaining lifetime
        if alert.is_expired(Utc::now()) {
            warn!(alert_id = %alert.id, "alert expired during verification");
            return self.expired_report(alert);
        }

        let comparisons: Vec<OddsComparison> = expected_legs(alert)
            .into_iter()
            .map(|leg| compare_leg(&leg, &quotes))
            .collect();

        let available = comparisons.iter().filter(|c| c.available).count();
        let fraction = available as f64 / comparisons.len() as f64;
        let min_fraction = if alert.kind == AlertKind::Arbitrage {
            1.0
        } else {
            self.config.min_available_fraction
        };

        if available == 0 || fraction < min_fraction {
            let reason = format!(
                "{}/{} expected legs still quoted",
                available,
                comparisons.len()
            );
            return self.finish(
                alert,
                &key,
                VerificationOutcome::MarketUnavailable,
                comparisons,
                false,
                Some(reason),
            );
        }

        let limits = self.limits_for(alert);
        let worst_shift = comparisons
            .iter()
            .filter(|c| {
                c.available
                    && (c.odds_shift > limits.odds
                        || c.prob_shift > limits.prob
                        || c.shift_pct > limits.pct)
            })
            .max_by_key(|c| OrderedFloat(c.odds_shift))
            .cloned();

        if let Some(shifted) = worst_shift {
            let reason = format!(
                "{} {} moved {:+.0} -> {:+.0} ({:.1} points, {:.1}% prob)",
                shifted.book,
                shifted.outcome,
                shifted.expected_odds,
                shifted.current_odds.unwrap_or(shifted.expected_odds),
                shifted.odds_shift,
                shifted.shift_pct * 100.0,
            );
            return self.finish(
                alert,
                &key,
                VerificationOutcome::OddsShifted,
                comparisons,
                false,
                Some(reason),
            );
        }

        self.finish(alert, &key, VerificationOutcome::Valid, comparisons, true, None)
    }

    /// Drop expired cache entries. The monitor calls this on its prune tick.
    pub fn prune_cache(&self, now: DateTime<Utc>) {
        self.report_cache
            .retain(|_, entry| !entry.is_expired(now, self.config.report_cache_ttl_secs));
    }

    fn finish(
        &self,
        alert: &Alert,
        key: &AlertKey,
        outcome: VerificationOutcome,
        comparisons: Vec<OddsComparison>,
        should_dispatch: bool,
        cancellation_reason: Option<String>,
    ) -> VerificationReport {
        let report = VerificationReport {
            alert_id: alert.id,
            outcome,
            comparisons,
            should_dispatch,
            cancellation_reason,
            verified_at: Utc::now(),
        };

        if should_dispatch {
            debug!(alert_id = %alert.id, outcome = %outcome, "verification passed");
        } else {
            warn!(
                alert_id = %alert.id,
                outcome = %outcome,
                reason = report.cancellation_reason.as_deref().unwrap_or(""),
                "verification cancelled alert"
            );
        }

        self.report_cache.insert(
            key.clone(),
            CachedReport {
                report: report.clone(),
                cached_at: Utc::now(),
            },
        );
        report
    }

    /// Expiry drops are alert-specific and never cached.
    fn expired_report(&self, alert: &Alert) -> VerificationReport {
        VerificationReport {
            alert_id: alert.id,
            outcome: VerificationOutcome::StaleData,
            comparisons: Vec::new(),
            should_dispatch: false,
            cancellation_reason: Some("alert expired during verification".to_string()),
            verified_at: Utc::now(),
        }
    }

    async fn fetch_quotes(&self, game_id: &str, market: MarketKind) -> Result<Vec<BookQuote>> {
        let mut attempt: u32 = 0;
        loop {
            match self.provider.quotes(game_id, &[market]).await {
                Ok(quotes) => return Ok(quotes),
                Err(err @ LinewatchError::MarketDataUnavailable(_)) => return Err(err),
                Err(err @ LinewatchError::RateLimited(_)) => return Err(err),
                Err(err) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        game_id,
                        attempt,
                        error = %err,
                        "verification re-fetch failed, retrying"
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(err) => {
                    return Err(LinewatchError::Verification(format!(
                        "quote re-fetch failed after {} attempts: {}",
                        attempt + 1,
                        err
                    )))
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
        Duration::from_millis(self.config.retry_delay_ms * attempt as u64 + jitter)
    }

    fn dispatch_despite_error(&self, priority: AlertPriority) -> bool {
        self.config
            .dispatch_on_error_priority
            .map_or(false, |floor| priority >= floor)
    }

    fn limits_for(&self, alert: &Alert) -> ShiftLimits {
        let mut scale = 1.0;
        if alert.priority == AlertPriority::Critical {
            scale = CRITICAL_THRESHOLD_SCALE;
        }
        if alert.kind == AlertKind::Arbitrage {
            scale = scale.min(ARBITRAGE_THRESHOLD_SCALE);
        }
        ShiftLimits {
            odds: self.config.max_odds_shift * scale,
            prob: self.config.max_prob_shift * scale,
            pct: self.config.max_shift_pct * scale,
        }
    }
}

/// The odds each leg of the alert was priced on.
fn expected_legs(alert: &Alert) -> Vec<ExpectedLeg> {
    match &alert.payload {
        AlertPayload::Arbitrage(opp) => opp
            .legs
            .iter()
            .map(|leg| ExpectedLeg {
                book: leg.book.clone(),
                outcome: leg.outcome.clone(),
                odds: leg.odds,
            })
            .collect(),
        AlertPayload::Value { primary, .. } => vec![ExpectedLeg {
            book: primary.sportsbook.clone(),
            outcome: primary.outcome.clone(),
            odds: primary.offered_odds,
        }],
    }
}

fn compare_leg(expected: &ExpectedLeg, quotes: &[BookQuote]) -> OddsComparison {
    let current = quotes
        .iter()
        .find(|q| q.bookmaker == expected.book && q.outcome == expected.outcome);

    let Some(quote) = current else {
        return OddsComparison {
            outcome: expected.outcome.clone(),
            book: expected.book.clone(),
            expected_odds: expected.odds,
            current_odds: None,
            odds_shift: 0.0,
            prob_shift: 0.0,
            shift_pct: 0.0,
            available: false,
        };
    };

    match (
        odds::american_to_implied(expected.odds),
        odds::american_to_implied(quote.american_odds),
    ) {
        (Ok(expected_prob), Ok(current_prob)) => {
            let prob_shift = (current_prob - expected_prob).abs();
            OddsComparison {
                outcome: expected.outcome.clone(),
                book: expected.book.clone(),
                expected_odds: expected.odds,
                current_odds: Some(quote.american_odds),
                odds_shift: (quote.american_odds - expected.odds).abs(),
                prob_shift,
                shift_pct: prob_shift / expected_prob,
                available: true,
            }
        }
        // A quote we cannot price is a quote we cannot act on
        _ => OddsComparison {
            outcome: expected.outcome.clone(),
            book: expected.book.clone(),
            expected_odds: expected.odds,
            current_odds: Some(quote.american_odds),
            odds_shift: 0.0,
            prob_shift: 0.0,
            shift_pct: 0.0,
            available: false,
        },
    }
}

fn unavailable_comparisons(alert: &Alert) -> Vec<OddsComparison> {
    expected_legs(alert)
        .into_iter()
        .map(|leg| OddsComparison {
            outcome: leg.outcome,
            book: leg.book,
            expected_odds: leg.odds,
            current_odds: None,
            odds_shift: 0.0,
            prob_shift: 0.0,
            shift_pct: 0.0,
            available: false,
        })
        .collect()
}
