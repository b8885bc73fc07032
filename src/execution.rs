//! Execution-cost model
//!
//! Deflates quoted odds to what a bettor can realistically get filled at.
//! Adjustments are applied in implied-probability space as multiplicative
//! penalties, in order: half the book's bid-ask spread, slippage scaled by
//! sport volatility, market impact above the book's size threshold, a flat
//! liquidity-tier penalty, and an NFL-only volatility penalty. Every step
//! can only worsen the bettor's price.
//!
//! # Sport parameters
//! - NFL: volatility 1.2x, supports three-way (ties), +10% impact penalty,
//!   0.2% flat volatility penalty
//! - NBA: volatility 1.0x, two-way only, no extras

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::ExecutionConfig;
use crate::domain::Sport;
use crate::error::{DetectError, LinewatchError, Result};
use crate::odds;

/// Ceiling on adjusted implied probability so it stays convertible to odds
const MAX_ADJUSTED_PROB: f64 = 0.9999;

/// Market-impact multiplier cap: 3x the threshold-relative stake
const MAX_IMPACT_MULTIPLIER: f64 = 3.0;

// ---------------------------------------------------------------------------
// Sport profile
// ---------------------------------------------------------------------------

/// Per-sport execution characteristics, passed explicitly into the model
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SportProfile {
    pub sport: Sport,
    /// Scales book slippage: in-game NFL lines move harder
    pub volatility_multiplier: f64,
    /// Whether the sport's moneyline has a tie leg
    pub supports_three_way: bool,
    /// Extra fraction added to the market-impact penalty
    pub extra_impact_penalty: f64,
    /// Flat penalty applied last (implied-prob fraction)
    pub flat_volatility_penalty: f64,
}

impl SportProfile {
    pub fn nfl() -> Self {
        Self {
            sport: Sport::Nfl,
            volatility_multiplier: 1.2,
            supports_three_way: true,
            extra_impact_penalty: 0.10,
            flat_volatility_penalty: 0.002,
        }
    }

    pub fn nba() -> Self {
        Self {
            sport: Sport::Nba,
            volatility_multiplier: 1.0,
            supports_three_way: false,
            extra_impact_penalty: 0.0,
            flat_volatility_penalty: 0.0,
        }
    }

    pub fn for_sport(sport: Sport) -> Self {
        match sport {
            Sport::Nfl => Self::nfl(),
            Sport::Nba => Self::nba(),
        }
    }

    /// Parse a sport key; unknown sports are a setup-time error
    pub fn from_key(key: &str) -> Result<Self> {
        let sport = Sport::from_str(key).map_err(|_| LinewatchError::UnknownSport(key.into()))?;
        Ok(Self::for_sport(sport))
    }
}

// ---------------------------------------------------------------------------
// Book profiles
// ---------------------------------------------------------------------------

/// Liquidity tier drives both a flat price penalty and the detector's
/// risk weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    High,
    Medium,
    Low,
}

impl LiquidityTier {
    /// Flat execution penalty: medium 0.5%, low 1.0%
    pub fn flat_penalty(&self) -> f64 {
        match self {
            LiquidityTier::High => 0.0,
            LiquidityTier::Medium => 0.005,
            LiquidityTier::Low => 0.010,
        }
    }

    /// Contribution to the execution-risk blend
    pub fn risk_weight(&self) -> f64 {
        match self {
            LiquidityTier::High => 0.05,
            LiquidityTier::Medium => 0.15,
            LiquidityTier::Low => 0.30,
        }
    }
}

/// Execution characteristics of a single sportsbook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookProfile {
    pub name: String,
    /// Typical bid-ask spread as a price fraction
    pub spread_pct: f64,
    /// Base slippage fraction before sport scaling
    pub slippage_pct: f64,
    pub liquidity: LiquidityTier,
    /// Historical fill reliability in [0, 1]
    pub reliability: f64,
    /// Largest stake the book accepts without review
    pub max_stake: f64,
    /// Stake above which market impact kicks in
    pub impact_threshold: f64,
    /// Impact cost per threshold multiple
    pub impact_rate: f64,
    /// Execution-delay risk in [0, 1]
    pub delay_risk: f64,
}

impl BookProfile {
    fn new(
        name: &str,
        spread_pct: f64,
        slippage_pct: f64,
        liquidity: LiquidityTier,
        reliability: f64,
        max_stake: f64,
        impact_threshold: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            spread_pct,
            slippage_pct,
            liquidity,
            reliability,
            max_stake,
            impact_threshold,
            impact_rate: match liquidity {
                LiquidityTier::High => 0.003,
                LiquidityTier::Medium => 0.004,
                LiquidityTier::Low => 0.005,
            },
            delay_risk: match liquidity {
                LiquidityTier::High => 0.10,
                LiquidityTier::Medium => 0.20,
                LiquidityTier::Low => 0.30,
            },
        }
    }

    /// Conservative profile for books not in the table
    pub fn fallback(name: &str) -> Self {
        Self::new(name, 0.050, 0.010, LiquidityTier::Low, 0.80, 5_000.0, 2_500.0)
    }

    pub fn unreliability(&self) -> f64 {
        (1.0 - self.reliability).max(0.0)
    }
}

/// The major national books; their presence lowers discrepancy risk
pub const MAJOR_BOOKS: [&str; 4] = ["draftkings", "fanduel", "betmgm", "caesars"];

pub fn is_major_book(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    MAJOR_BOOKS.iter().any(|m| *m == lower)
}

// ---------------------------------------------------------------------------
// Execution model
// ---------------------------------------------------------------------------

/// Step-by-step cost breakdown of one adjustment, for logs and payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAdjustment {
    pub book: String,
    pub original_odds: f64,
    pub original_prob: f64,
    /// Implied-prob cost of each step, in application order
    pub spread_cost: f64,
    pub slippage_cost: f64,
    pub impact_cost: f64,
    pub liquidity_cost: f64,
    pub volatility_cost: f64,
    pub adjusted_prob: f64,
    pub adjusted_odds: f64,
}

impl ExecutionAdjustment {
    /// Sum of all cost components
    pub fn total_cost(&self) -> f64 {
        self.adjusted_prob - self.original_prob
    }
}

/// Per-book, per-sport deflation of quoted odds
#[derive(Debug, Clone)]
pub struct ExecutionModel {
    books: HashMap<String, BookProfile>,
}

impl ExecutionModel {
    /// Build the model: the built-in book table plus any config overrides
    pub fn new(config: &ExecutionConfig) -> Self {
        use LiquidityTier::{High, Medium};

        let mut books = HashMap::new();
        for profile in [
            BookProfile::new("draftkings", 0.025, 0.004, High, 0.98, 50_000.0, 10_000.0),
            BookProfile::new("fanduel", 0.025, 0.004, High, 0.98, 50_000.0, 10_000.0),
            BookProfile::new("betmgm", 0.030, 0.005, High, 0.96, 25_000.0, 7_500.0),
            BookProfile::new("caesars", 0.030, 0.005, High, 0.95, 25_000.0, 7_500.0),
            BookProfile::new("pointsbet", 0.040, 0.007, Medium, 0.92, 10_000.0, 5_000.0),
            BookProfile::new("espnbet", 0.045, 0.008, Medium, 0.90, 10_000.0, 5_000.0),
        ] {
            books.insert(profile.name.clone(), profile);
        }
        for profile in &config.books {
            books.insert(profile.name.to_ascii_lowercase(), profile.clone());
        }
        Self { books }
    }

    /// Profile for a book, falling back to the conservative default
    pub fn book(&self, name: &str) -> BookProfile {
        let key = name.to_ascii_lowercase();
        self.books
            .get(&key)
            .cloned()
            .unwrap_or_else(|| BookProfile::fallback(&key))
    }

    /// Adjust quoted odds for execution costs.
    ///
    /// Penalties multiply implied probability, so order matters only for
    /// the per-step breakdown; the final price is capped just below
    /// certainty to stay convertible back to American odds.
    pub fn adjust(
        &self,
        quoted_odds: f64,
        book_name: &str,
        stake: f64,
        sport: &SportProfile,
    ) -> std::result::Result<ExecutionAdjustment, DetectError> {
        let book = self.book(book_name);
        let original_prob = odds::american_to_implied(quoted_odds)?;

        let half_spread = book.spread_pct / 2.0;
        let after_spread = (original_prob * (1.0 + half_spread)).min(MAX_ADJUSTED_PROB);

        let slippage = book.slippage_pct * sport.volatility_multiplier;
        let after_slippage = (after_spread * (1.0 + slippage)).min(MAX_ADJUSTED_PROB);

        let impact = self.impact_penalty(&book, stake, sport);
        let after_impact = (after_slippage * (1.0 + impact)).min(MAX_ADJUSTED_PROB);

        let liquidity = book.liquidity.flat_penalty();
        let after_liquidity = (after_impact * (1.0 + liquidity)).min(MAX_ADJUSTED_PROB);

        let volatility = sport.flat_volatility_penalty;
        let adjusted_prob = (after_liquidity * (1.0 + volatility)).min(MAX_ADJUSTED_PROB);

        let adjusted_odds = odds::implied_to_american(adjusted_prob)?;

        Ok(ExecutionAdjustment {
            book: book.name.clone(),
            original_odds: quoted_odds,
            original_prob,
            spread_cost: after_spread - original_prob,
            slippage_cost: after_slippage - after_spread,
            impact_cost: after_impact - after_slippage,
            liquidity_cost: after_liquidity - after_impact,
            volatility_cost: adjusted_prob - after_liquidity,
            adjusted_prob,
            adjusted_odds,
        })
    }

    /// Impact penalty fraction when the stake exceeds the book's threshold
    fn impact_penalty(&self, book: &BookProfile, stake: f64, sport: &SportProfile) -> f64 {
        if stake <= book.impact_threshold || book.impact_threshold <= 0.0 {
            return 0.0;
        }
        let multiplier = (stake / book.impact_threshold).min(MAX_IMPACT_MULTIPLIER);
        book.impact_rate * multiplier * (1.0 + sport.extra_impact_penalty)
    }
}

impl Default for ExecutionModel {
    fn default() -> Self {
        Self::new(&ExecutionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
