//! Odds feed collaborators
//!
//! The scanner and verifier pull quotes through the [`OddsProvider`] trait.
//! The provider is chosen once at construction; a [`NullOddsProvider`] is
//! injected when no feed is configured so the absence of data is explicit
//! rather than silently substituted.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::domain::{BookQuote, MarketKind, Sport};
use crate::error::{LinewatchError, Result};

mod odds_api;

pub use odds_api::OddsApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    OddsApi,
    Null,
}

impl Default for FeedKind {
    fn default() -> Self {
        Self::Null
    }
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OddsApi => "odds_api",
            Self::Null => "null",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "odds_api" | "oddsapi" | "the_odds_api" => Ok(Self::OddsApi),
            "null" | "none" => Ok(Self::Null),
            _ => Err("invalid feed; expected odds_api|null"),
        }
    }
}

pub fn parse_feed_kind(raw: &str) -> Result<FeedKind> {
    FeedKind::from_str(raw).map_err(|e| LinewatchError::Validation(e.to_string()))
}

/// Source of fresh book quotes for a game
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsProvider: Send + Sync {
    fn kind(&self) -> FeedKind;

    /// Current quotes for the given markets of one game. Every quote is
    /// timestamped by the source so staleness stays observable downstream.
    async fn quotes(&self, game_id: &str, markets: &[MarketKind]) -> Result<Vec<BookQuote>>;
}

/// Create the runtime odds provider from feed configuration.
///
/// Falls back to [`NullOddsProvider`] when no kind is set so a missing feed
/// surfaces as explicit unavailability rather than fabricated quotes.
pub fn build_provider(feed: &FeedConfig, sport: Sport) -> Result<Arc<dyn OddsProvider>> {
    match parse_feed_kind(&feed.kind)? {
        FeedKind::OddsApi => {
            let mut feed = feed.clone();
            if feed.api_key.is_none() {
                feed.api_key = std::env::var("THE_ODDS_API_KEY").ok();
            }
            Ok(Arc::new(OddsApiClient::from_config(&feed, sport)?))
        }
        FeedKind::Null => Ok(Arc::new(NullOddsProvider)),
    }
}

/// Provider used when no feed is configured; every fetch reports the
/// market as unavailable
#[derive(Debug, Default)]
pub struct NullOddsProvider;

#[async_trait]
impl OddsProvider for NullOddsProvider {
    fn kind(&self) -> FeedKind {
        FeedKind::Null
    }

    async fn quotes(&self, game_id: &str, _markets: &[MarketKind]) -> Result<Vec<BookQuote>> {
        Err(LinewatchError::MarketDataUnavailable(format!(
            "no odds feed configured (game {})",
            game_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_feed_kind_accepts_aliases() {
        assert_eq!(
            parse_feed_kind("odds_api").expect("odds_api should parse"),
            FeedKind::OddsApi
        );
        assert_eq!(
            parse_feed_kind("oddsapi").expect("oddsapi alias should parse"),
            FeedKind::OddsApi
        );
        assert_eq!(
            parse_feed_kind("null").expect("null should parse"),
            FeedKind::Null
        );
    }

    #[test]
    fn parse_feed_kind_rejects_unknown_value() {
        assert!(parse_feed_kind("sportsradar").is_err());
    }

    #[tokio::test]
    async fn null_provider_reports_unavailable() {
        let provider = NullOddsProvider;
        let err = provider
            .quotes("game-1", &[MarketKind::Moneyline])
            .await
            .unwrap_err();
        assert!(matches!(err, LinewatchError::MarketDataUnavailable(_)));
    }
}
