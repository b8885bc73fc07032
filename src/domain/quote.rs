use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LinewatchError;

/// Sports with distinct execution characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Nfl,
    Nba,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Nfl => "nfl",
            Sport::Nba => "nba",
        }
    }

    /// Sport key used by odds-aggregation APIs
    pub fn api_key(&self) -> &'static str {
        match self {
            Sport::Nfl => "americanfootball_nfl",
            Sport::Nba => "basketball_nba",
        }
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Sport {
    type Err = LinewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nfl" | "americanfootball_nfl" | "football" => Ok(Sport::Nfl),
            "nba" | "basketball_nba" | "basketball" => Ok(Sport::Nba),
            other => Err(LinewatchError::UnknownSport(other.to_string())),
        }
    }
}

/// Market types the scanner compares across books
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Moneyline => "moneyline",
            MarketKind::Spread => "spread",
            MarketKind::Total => "total",
        }
    }

    /// Market key used by odds-aggregation APIs
    pub fn api_key(&self) -> &'static str {
        match self {
            MarketKind::Moneyline => "h2h",
            MarketKind::Spread => "spreads",
            MarketKind::Total => "totals",
        }
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MarketKind {
    type Err = LinewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moneyline" | "h2h" | "ml" => Ok(MarketKind::Moneyline),
            "spread" | "spreads" => Ok(MarketKind::Spread),
            "total" | "totals" | "over_under" => Ok(MarketKind::Total),
            other => Err(LinewatchError::Validation(format!(
                "Unknown market kind: {}",
                other
            ))),
        }
    }
}

/// A single book's quote for one outcome, sourced fresh each scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookQuote {
    /// Bookmaker key (lowercase, e.g. "draftkings")
    pub bookmaker: String,
    pub market: MarketKind,
    /// Outcome label (team name, "over"/"under", etc.)
    pub outcome: String,
    /// Quoted American odds (+150, -110, ...)
    pub american_odds: f64,
    /// Point line for spread/total markets
    pub line: Option<f64>,
    /// When the book last updated this price
    pub timestamp: DateTime<Utc>,
}

impl BookQuote {
    pub fn new(bookmaker: &str, market: MarketKind, outcome: &str, american_odds: f64) -> Self {
        Self {
            bookmaker: bookmaker.to_ascii_lowercase(),
            market,
            outcome: outcome.to_string(),
            american_odds,
            line: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_line(mut self, line: f64) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Age of the quote in seconds (never negative)
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds().max(0)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        self.age_secs(now) > max_age_secs as i64
    }
}
