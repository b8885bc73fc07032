//! Command-line interface
//!
//! `run` is the long-lived monitor; the other subcommands are one-shot
//! operator tools that load config, do their work, and exit.

use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::AppConfig;
use crate::detector::{ArbitrageDetector, DiscrepancyScanner};
use crate::domain::{DiscrepancyKind, Sport};
use crate::error::{LinewatchError, Result};
use crate::execution::ExecutionModel;
use crate::feed::build_provider;
use crate::odds;
use crate::persistence::MemoryOpportunityLog;

#[derive(Parser)]
#[command(name = "linewatch")]
#[command(version)]
#[command(about = "Cross-book odds discrepancy scanner and alerter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (default: linewatch.toml when present)
    #[arg(short, long, env = "LINEWATCH_CONFIG", global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitor until interrupted
    Run {
        /// Game ids to scan (comma-separated; overrides the config list)
        #[arg(short, long, value_delimiter = ',')]
        games: Vec<String>,
        /// Sport key (nfl, nba; overrides the config value)
        #[arg(short, long)]
        sport: Option<String>,
        /// Force the log-only sink stack (no webhooks)
        #[arg(long)]
        dry_run: bool,
    },
    /// One-shot scan: print discrepancies for the given games and exit
    Scan {
        /// Game ids to scan (comma-separated; overrides the config list)
        #[arg(short, long, value_delimiter = ',')]
        games: Vec<String>,
        /// Sport key (nfl, nba; overrides the config value)
        #[arg(short, long)]
        sport: Option<String>,
    },
    /// Convert between American odds, decimal odds, and implied probability
    Odds {
        /// Odds value: American (-110, +120, ...) or decimal with --decimal
        #[arg(allow_hyphen_values = true)]
        odds: f64,
        /// Interpret the value as decimal odds
        #[arg(long)]
        decimal: bool,
    },
    /// Load and validate configuration, print the effective values
    ConfigCheck,
}

/// Merge command-line overrides into loaded configuration
pub fn apply_overrides(config: &mut AppConfig, games: &[String], sport: Option<&str>) {
    if !games.is_empty() {
        config.scanner.game_ids = games.to_vec();
    }
    if let Some(sport) = sport {
        config.scanner.sport = sport.to_string();
    }
}

#[derive(Tabled)]
struct DiscrepancyRow {
    #[tabled(rename = "Game")]
    game: String,
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Edge %")]
    edge: String,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Books")]
    books: String,
    #[tabled(rename = "Confirmed")]
    confirmed: String,
}

/// One-shot scan over the configured games, rendered as a table
pub async fn run_scan(config: &AppConfig) -> Result<()> {
    if config.scanner.game_ids.is_empty() {
        return Err(LinewatchError::Validation(
            "no games to scan; pass --games or set scanner.game_ids".to_string(),
        ));
    }

    let sport = Sport::from_str(&config.scanner.sport)?;
    let provider = build_provider(&config.feed, sport)?;
    let detector = Arc::new(ArbitrageDetector::new(
        ExecutionModel::new(&config.execution),
        Arc::new(MemoryOpportunityLog::new(config.detector.history_max_entries)),
        &config.detector,
    ));
    let scanner = DiscrepancyScanner::new(provider, detector, config)?;

    let mut rows = Vec::new();
    let mut quotes_seen = 0usize;
    let mut stale_discarded = 0u64;
    for game_id in &config.scanner.game_ids {
        match scanner.scan_game(game_id).await {
            Ok(outcome) => {
                quotes_seen += outcome.quotes_seen;
                stale_discarded += outcome.stale_discarded;
                for discrepancy in &outcome.discrepancies {
                    let confirmed = match discrepancy.kind {
                        DiscrepancyKind::Arbitrage if discrepancy.cross_checked => "yes",
                        DiscrepancyKind::Arbitrage => "no",
                        DiscrepancyKind::Value => "-",
                    };
                    rows.push(DiscrepancyRow {
                        game: discrepancy.game_id.clone(),
                        market: discrepancy.market.to_string(),
                        kind: discrepancy.kind.to_string(),
                        edge: format!("{:.2}", discrepancy.headline_pct() * 100.0),
                        risk: discrepancy.risk_level.to_string(),
                        books: discrepancy.books_compared.join(", "),
                        confirmed: confirmed.to_string(),
                    });
                }
            }
            Err(err) => eprintln!("scan failed for {}: {}", game_id, err),
        }
    }

    if rows.is_empty() {
        println!(
            "No discrepancies found ({} quotes seen, {} stale discarded).",
            quotes_seen, stale_discarded
        );
        return Ok(());
    }

    let mut table = Table::new(&rows);
    table.with(Style::sharp());
    println!("{}", table);
    println!(
        "{} discrepancies across {} games ({} quotes seen, {} stale discarded).",
        rows.len(),
        config.scanner.game_ids.len(),
        quotes_seen,
        stale_discarded
    );
    Ok(())
}

/// Odds conversion sanity check for operators
pub fn show_odds(value: f64, as_decimal: bool) -> Result<()> {
    let american = if as_decimal {
        odds::decimal_to_american(value)?
    } else {
        odds::validate_american(value)?;
        value
    };
    let decimal = odds::american_to_decimal(american)?;
    let implied = odds::american_to_implied(american)?;
    let returns = odds::payout(100.0, american)?;

    println!("American:     {:+.0}", american);
    println!("Decimal:      {:.4}", decimal);
    println!("Implied prob: {:.2}%", implied * 100.0);
    println!("$100 returns: ${:.2}", returns);
    Ok(())
}

/// Validate configuration and print the effective values
pub fn check_config(config: &AppConfig) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            println!("Configuration OK");
            println!("{:#?}", config);
            Ok(())
        }
        Err(errors) => {
            eprintln!("Configuration invalid:");
            for error in &errors {
                eprintln!("  - {}", error);
            }
            Err(LinewatchError::Validation(format!(
                "{} configuration error(s)",
                errors.len()
            )))
        }
    }
}
