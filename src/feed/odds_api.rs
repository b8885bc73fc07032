// The Odds API integration
// Fetches live sportsbook quotes for one game across multiple books

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::domain::{BookQuote, MarketKind, Sport};
use crate::error::{LinewatchError, Result};
use crate::feed::{FeedKind, OddsProvider};

const DEFAULT_MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_JITTER_MS: u64 = 250;

/// Odds for a single outcome as reported by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomePrice {
    pub name: String,
    /// American odds
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

/// One market (h2h, spreads, totals) from one bookmaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOdds {
    pub key: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    pub outcomes: Vec<OutcomePrice>,
}

/// All markets one bookmaker posts for the event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmakerOdds {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    pub markets: Vec<MarketOdds>,
}

/// Event payload from `/sports/{sport}/events/{id}/odds`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOdds {
    pub id: String,
    #[serde(default)]
    pub sport_key: String,
    #[serde(default)]
    pub commence_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    pub bookmakers: Vec<BookmakerOdds>,
}

/// The Odds API client. One instance serves one sport; the scanner owns
/// the sport choice via configuration.
pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    sport: Sport,
    regions: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl OddsApiClient {
    pub fn from_config(feed: &FeedConfig, sport: Sport) -> Result<Self> {
        let api_key = feed
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                LinewatchError::Validation(
                    "feed.api_key is required for the odds_api feed".to_string(),
                )
            })?;

        let http = Client::builder()
            .user_agent(concat!("linewatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(feed.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: feed.base_url.trim_end_matches('/').to_string(),
            api_key,
            sport,
            regions: feed.regions.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    async fn backoff(&self, attempt: u32) {
        let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
        let delay = self.retry_delay * (attempt + 1) + Duration::from_millis(jitter);
        tokio::time::sleep(delay).await;
    }

    async fn fetch_event(&self, game_id: &str, market_param: &str) -> Result<EventOdds> {
        let url = format!(
            "{}/sports/{}/events/{}/odds",
            self.base_url,
            self.sport.api_key(),
            game_id
        );

        debug!(%url, markets = market_param, "fetching event odds");

        let mut attempt = 0u32;
        loop {
            let sent = self
                .http
                .get(&url)
                .query(&[
                    ("apiKey", self.api_key.as_str()),
                    ("regions", self.regions.as_str()),
                    ("markets", market_param),
                    ("oddsFormat", "american"),
                    ("dateFormat", "iso"),
                ])
                .send()
                .await;

            match sent {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<EventOdds>().await?);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(LinewatchError::MarketDataUnavailable(format!(
                            "event {} not found upstream",
                            game_id
                        )));
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(LinewatchError::RateLimited(
                            "odds api request quota exhausted".to_string(),
                        ));
                    }

                    let text = resp.text().await.unwrap_or_default();
                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(%status, attempt, "odds api server error, retrying");
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(LinewatchError::MarketDataUnavailable(format!(
                        "odds api error {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    if attempt < self.max_retries && (e.is_timeout() || e.is_connect()) {
                        warn!(error = %e, attempt, "odds api request failed, retrying");
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl OddsProvider for OddsApiClient {
    fn kind(&self) -> FeedKind {
        FeedKind::OddsApi
    }

    async fn quotes(&self, game_id: &str, markets: &[MarketKind]) -> Result<Vec<BookQuote>> {
        if markets.is_empty() {
            return Ok(Vec::new());
        }

        let market_param = markets
            .iter()
            .map(|m| m.api_key())
            .collect::<Vec<_>>()
            .join(",");

        let event = self.fetch_event(game_id, &market_param).await?;
        let quotes = flatten_event(&event, markets);

        debug!(
            game_id,
            books = event.bookmakers.len(),
            quotes = quotes.len(),
            "flattened event odds"
        );
        Ok(quotes)
    }
}

/// Flatten the nested API payload into per-outcome quotes, keeping only
/// the requested markets. Quotes carry the book's own update time when
/// the API reports one.
fn flatten_event(event: &EventOdds, markets: &[MarketKind]) -> Vec<BookQuote> {
    let mut quotes = Vec::new();

    for book in &event.bookmakers {
        for market in &book.markets {
            let kind = match MarketKind::from_str(&market.key) {
                Ok(kind) => kind,
                Err(_) => continue,
            };
            if !markets.contains(&kind) {
                continue;
            }

            let stamped = market
                .last_update
                .or(book.last_update)
                .unwrap_or_else(Utc::now);

            for outcome in &market.outcomes {
                let mut quote = BookQuote::new(&book.key, kind, &outcome.name, outcome.price)
                    .with_timestamp(stamped);
                if let Some(point) = outcome.point {
                    quote = quote.with_line(point);
                }
                quotes.push(quote);
            }
        }
    }

    quotes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventOdds {
        let raw = r#"{
            "id": "evt-123",
            "sport_key": "basketball_nba",
            "commence_time": "2025-01-15T00:10:00Z",
            "home_team": "Boston Celtics",
            "away_team": "Los Angeles Lakers",
            "bookmakers": [
                {
                    "key": "DraftKings",
                    "title": "DraftKings",
                    "last_update": "2025-01-14T23:59:00Z",
                    "markets": [
                        {
                            "key": "h2h",
                            "last_update": "2025-01-14T23:59:30Z",
                            "outcomes": [
                                {"name": "Boston Celtics", "price": -150.0},
                                {"name": "Los Angeles Lakers", "price": 130.0}
                            ]
                        },
                        {
                            "key": "spreads",
                            "outcomes": [
                                {"name": "Boston Celtics", "price": -110.0, "point": -3.5},
                                {"name": "Los Angeles Lakers", "price": -110.0, "point": 3.5}
                            ]
                        },
                        {
                            "key": "player_points",
                            "outcomes": [
                                {"name": "Jayson Tatum Over", "price": -115.0, "point": 27.5}
                            ]
                        }
                    ]
                },
                {
                    "key": "fanduel",
                    "title": "FanDuel",
                    "markets": [
                        {
                            "key": "h2h",
                            "outcomes": [
                                {"name": "Boston Celtics", "price": -145.0},
                                {"name": "Los Angeles Lakers", "price": 125.0}
                            ]
                        }
                    ]
                }
            ]
        }"#;
        serde_json::from_str(raw).expect("fixture should deserialize")
    }

    #[test]
    fn test_flatten_moneyline_only() {
        let event = sample_event();
        let quotes = flatten_event(&event, &[MarketKind::Moneyline]);

        assert_eq!(quotes.len(), 4);
        assert!(quotes.iter().all(|q| q.market == MarketKind::Moneyline));
        // bookmaker keys are normalized to lowercase
        assert!(quotes.iter().any(|q| q.bookmaker == "draftkings"));
        assert!(quotes.iter().any(|q| q.bookmaker == "fanduel"));
    }

    #[test]
    fn test_flatten_carries_lines_and_timestamps() {
        let event = sample_event();
        let quotes = flatten_event(&event, &[MarketKind::Moneyline, MarketKind::Spread]);

        assert_eq!(quotes.len(), 6);

        let spread = quotes
            .iter()
            .find(|q| q.market == MarketKind::Spread && q.outcome == "Boston Celtics")
            .expect("spread quote present");
        assert_eq!(spread.line, Some(-3.5));

        // market-level last_update wins over the bookmaker-level one
        let dk_ml = quotes
            .iter()
            .find(|q| q.bookmaker == "draftkings" && q.market == MarketKind::Moneyline)
            .expect("dk moneyline present");
        assert_eq!(
            dk_ml.timestamp,
            "2025-01-14T23:59:30Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_flatten_skips_unknown_market_keys() {
        let event = sample_event();
        let quotes = flatten_event(
            &event,
            &[MarketKind::Moneyline, MarketKind::Spread, MarketKind::Total],
        );
        assert!(quotes.iter().all(|q| q.outcome != "Jayson Tatum Over"));
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let mut feed = FeedConfig::default();
        feed.kind = "odds_api".to_string();
        feed.api_key = None;

        assert!(OddsApiClient::from_config(&feed, Sport::Nba).is_err());
    }

    #[test]
    fn test_from_config_trims_trailing_slash() {
        let mut feed = FeedConfig::default();
        feed.api_key = Some("test-key".to_string());
        feed.base_url = "https://api.the-odds-api.com/v4/".to_string();

        let client = OddsApiClient::from_config(&feed, Sport::Nfl).expect("client builds");
        assert_eq!(client.base_url(), "https://api.the-odds-api.com/v4");
        assert_eq!(client.sport(), Sport::Nfl);
    }
}
