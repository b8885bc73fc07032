use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::domain::AlertPriority;
use crate::execution::BookProfile;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health server port (default: 9090; None disables the server)
    #[serde(default = "default_health_port")]
    pub health_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            detector: DetectorConfig::default(),
            execution: ExecutionConfig::default(),
            verification: VerificationConfig::default(),
            alerts: AlertsConfig::default(),
            feed: FeedConfig::default(),
            logging: LoggingConfig::default(),
            health_port: default_health_port(),
        }
    }
}

fn default_health_port() -> Option<u16> {
    Some(9090)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Seconds between scan ticks
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Quotes older than this are discarded before detection
    #[serde(default = "default_max_data_age")]
    pub max_data_age_secs: u64,
    /// Minimum edge vs consensus to flag a value bet (fraction)
    #[serde(default = "default_min_value_edge")]
    pub min_value_edge: f64,
    /// Sport key for execution profiles ("nfl" or "nba")
    #[serde(default = "default_sport")]
    pub sport: String,
    /// Games to scan, when not given on the command line
    #[serde(default)]
    pub game_ids: Vec<String>,
    /// Market kinds to compare ("moneyline", "spread", "total")
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,
}

fn default_scan_interval() -> u64 {
    60
}

fn default_max_data_age() -> u64 {
    60
}

fn default_min_value_edge() -> f64 {
    0.05
}

fn default_sport() -> String {
    "nba".to_string()
}

fn default_markets() -> Vec<String> {
    vec!["moneyline".to_string()]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            max_data_age_secs: default_max_data_age(),
            min_value_edge: default_min_value_edge(),
            sport: default_sport(),
            game_ids: Vec::new(),
            markets: default_markets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Hard floor on profit margin at detection time (fraction)
    #[serde(default = "default_min_profit_margin")]
    pub min_profit_margin: f64,
    /// Tolerance below 1.0 the implied-prob sum must clear
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Notional stake split across legs
    #[serde(default = "default_total_stake")]
    pub total_stake: f64,
    /// Floor on risk-adjusted profit in validate()
    #[serde(default = "default_min_risk_adjusted_profit")]
    pub min_risk_adjusted_profit: f64,
    /// Bound on the in-memory opportunity history
    #[serde(default = "default_history_max_entries")]
    pub history_max_entries: usize,
    #[serde(default = "default_history_max_age")]
    pub history_max_age_secs: u64,
    /// When set, every detected opportunity is appended to this JSONL file
    #[serde(default)]
    pub opportunity_log_path: Option<String>,
}

fn default_min_profit_margin() -> f64 {
    0.005
}

fn default_epsilon() -> f64 {
    0.001
}

fn default_total_stake() -> f64 {
    1000.0
}

fn default_min_risk_adjusted_profit() -> f64 {
    0.001
}

fn default_history_max_entries() -> usize {
    500
}

fn default_history_max_age() -> u64 {
    3600
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_profit_margin: default_min_profit_margin(),
            epsilon: default_epsilon(),
            total_stake: default_total_stake(),
            min_risk_adjusted_profit: default_min_risk_adjusted_profit(),
            history_max_entries: default_history_max_entries(),
            history_max_age_secs: default_history_max_age(),
            opportunity_log_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExecutionConfig {
    /// Book profile overrides merged over the built-in table
    #[serde(default)]
    pub books: Vec<BookProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Max tolerated shift in American points
    #[serde(default = "default_max_odds_shift")]
    pub max_odds_shift: f64,
    /// Max tolerated absolute implied-probability shift
    #[serde(default = "default_max_prob_shift")]
    pub max_prob_shift: f64,
    /// Max tolerated relative implied-probability shift
    #[serde(default = "default_max_shift_pct")]
    pub max_shift_pct: f64,
    /// Re-fetch attempts before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Fraction of expected legs that must still be quoted
    #[serde(default = "default_min_available_fraction")]
    pub min_available_fraction: f64,
    /// Verification reports are cached per key for this long
    #[serde(default = "default_report_cache_ttl")]
    pub report_cache_ttl_secs: u64,
    /// When set, alerts at or above this priority dispatch even if the
    /// verification fetch fails. Default: everything cancels.
    #[serde(default)]
    pub dispatch_on_error_priority: Option<AlertPriority>,
}

fn default_max_odds_shift() -> f64 {
    10.0
}

fn default_max_prob_shift() -> f64 {
    0.02
}

fn default_max_shift_pct() -> f64 {
    0.05
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_min_available_fraction() -> f64 {
    0.5
}

fn default_report_cache_ttl() -> u64 {
    5
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_odds_shift: default_max_odds_shift(),
            max_prob_shift: default_max_prob_shift(),
            max_shift_pct: default_max_shift_pct(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            min_available_fraction: default_min_available_fraction(),
            report_cache_ttl_secs: default_report_cache_ttl(),
            dispatch_on_error_priority: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Minimum interval between alerts sharing a (game, market, kind) key
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,
    /// Alert-level profit filter, applied on top of the detector floor
    #[serde(default = "default_min_arbitrage_profit")]
    pub min_arbitrage_profit: f64,
    /// Bounded alert queue size; overflow drops the newest
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Arbitrage alerts expire this many seconds after creation
    #[serde(default = "default_arbitrage_expiry")]
    pub arbitrage_expiry_secs: u64,
    /// Value alerts expire this many seconds after creation
    #[serde(default = "default_value_expiry")]
    pub value_expiry_secs: u64,
    /// Optional webhook destination for dispatched alerts
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_alert_cooldown() -> u64 {
    300
}

fn default_min_arbitrage_profit() -> f64 {
    0.02
}

fn default_queue_capacity() -> usize {
    64
}

fn default_arbitrage_expiry() -> u64 {
    600
}

fn default_value_expiry() -> u64 {
    1800
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            alert_cooldown_secs: default_alert_cooldown(),
            min_arbitrage_profit: default_min_arbitrage_profit(),
            queue_capacity: default_queue_capacity(),
            arbitrage_expiry_secs: default_arbitrage_expiry(),
            value_expiry_secs: default_value_expiry(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Provider kind: "odds_api" or "null"
    #[serde(default = "default_feed_kind")]
    pub kind: String,
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,
    /// API key, usually via LINEWATCH__FEED__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_feed_timeout")]
    pub request_timeout_secs: u64,
    /// Bookmaker regions requested from the feed
    #[serde(default = "default_feed_regions")]
    pub regions: String,
}

fn default_feed_kind() -> String {
    "null".to_string()
}

fn default_feed_base_url() -> String {
    "https://api.the-odds-api.com/v4".to_string()
}

fn default_feed_timeout() -> u64 {
    10
}

fn default_feed_regions() -> String {
    "us".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            kind: default_feed_kind(),
            base_url: default_feed_base_url(),
            api_key: None,
            request_timeout_secs: default_feed_timeout(),
            regions: default_feed_regions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling log files (console-only when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None::<&str>)
    }

    /// Load configuration, optionally from an explicit file path
    pub fn load_from<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = match path {
            Some(p) => builder.add_source(File::from(p.as_ref()).required(true)),
            None => builder.add_source(File::with_name("linewatch").required(false)),
        };

        // Override with environment variables (LINEWATCH__SCANNER__SPORT, etc.)
        builder = builder.add_source(
            Environment::with_prefix("LINEWATCH")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.scanner.scan_interval_secs == 0 {
            errors.push("scanner.scan_interval_secs must be positive".to_string());
        }

        if self.scanner.min_value_edge <= 0.0 || self.scanner.min_value_edge >= 1.0 {
            errors.push("scanner.min_value_edge must be between 0 and 1".to_string());
        }

        if self.detector.min_profit_margin <= 0.0 || self.detector.min_profit_margin >= 1.0 {
            errors.push("detector.min_profit_margin must be between 0 and 1".to_string());
        }

        if self.detector.total_stake <= 0.0 {
            errors.push("detector.total_stake must be positive".to_string());
        }

        if self.alerts.min_arbitrage_profit < self.detector.min_profit_margin {
            errors.push(format!(
                "alerts.min_arbitrage_profit ({}) is below the detector floor ({}); the \
                 alert filter layers on top of detection and cannot widen it",
                self.alerts.min_arbitrage_profit, self.detector.min_profit_margin
            ));
        }

        if self.alerts.queue_capacity == 0 {
            errors.push("alerts.queue_capacity must be positive".to_string());
        }

        if self.verification.min_available_fraction < 0.0
            || self.verification.min_available_fraction > 1.0
        {
            errors.push("verification.min_available_fraction must be in [0, 1]".to_string());
        }

        if let Some(url) = &self.alerts.webhook_url {
            if url::Url::parse(url).is_err() {
                errors.push(format!("alerts.webhook_url is not a valid URL: {}", url));
            }
        }

        if self.feed.kind != "null" && self.feed.kind != "odds_api" {
            errors.push(format!(
                "feed.kind must be \"odds_api\" or \"null\", got {:?}",
                self.feed.kind
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
