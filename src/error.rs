use thiserror::Error;

/// Main error type for the scanner
#[derive(Error, Debug)]
pub enum LinewatchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown sport: {0}")]
    UnknownSport(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Detection errors
    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Stale data: {0}")]
    StaleData(String),

    // Verification errors
    #[error("Verification failed: {0}")]
    Verification(String),

    // Alert delivery errors
    #[error("Alert sink error: {sink} - {reason}")]
    SinkFailure { sink: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for LinewatchError
pub type Result<T> = std::result::Result<T, LinewatchError>;

/// Specific error types raised by the detectors
#[derive(Error, Debug, Clone)]
pub enum DetectError {
    #[error("Invalid odds {odds}: {reason}")]
    InvalidOdds { odds: f64, reason: String },

    #[error("Insufficient books: found {found}, need {required}")]
    InsufficientBooks { found: usize, required: usize },

    #[error("Unsupported market shape: {0}")]
    UnsupportedMarketShape(String),

    #[error("Stale signal from {book}: quote is {age_secs}s old (max {max_secs}s)")]
    StaleSignal {
        book: String,
        age_secs: i64,
        max_secs: u64,
    },
}

impl From<DetectError> for LinewatchError {
    fn from(err: DetectError) -> Self {
        LinewatchError::Detection(err.to_string())
    }
}
