use clap::Parser;
use linewatch::alerts::{build_sinks, AlertSink, LogAlertSink};
use linewatch::cli::{self, Cli, Commands};
use linewatch::config::{AppConfig, LoggingConfig};
use linewatch::detector::{ArbitrageDetector, DiscrepancyScanner};
use linewatch::domain::Sport;
use linewatch::error::{LinewatchError, Result};
use linewatch::execution::ExecutionModel;
use linewatch::feed::build_provider;
use linewatch::monitor::Monitor;
use linewatch::persistence::{JsonlOpportunityLog, NullOpportunityLog, OpportunityLog};
use linewatch::services::{AppState, HealthServer, Metrics};
use linewatch::verifier::FinalVerifier;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            games,
            sport,
            dry_run,
        } => {
            let _guard = init_logging(&config.logging);
            cli::apply_overrides(&mut config, &games, sport.as_deref());
            run_monitor(config, dry_run).await?;
        }
        Commands::Scan { games, sport } => {
            init_logging_simple();
            cli::apply_overrides(&mut config, &games, sport.as_deref());
            cli::run_scan(&config).await?;
        }
        Commands::Odds { odds, decimal } => {
            init_logging_simple();
            cli::show_odds(odds, decimal)?;
        }
        Commands::ConfigCheck => {
            init_logging_simple();
            cli::check_config(&config)?;
        }
    }

    Ok(())
}

async fn run_monitor(config: AppConfig, dry_run: bool) -> Result<()> {
    if let Err(errors) = config.validate() {
        for error in &errors {
            error!("config: {}", error);
        }
        return Err(LinewatchError::Validation(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }
    if config.scanner.game_ids.is_empty() {
        return Err(LinewatchError::Validation(
            "no games to watch; pass --games or set scanner.game_ids".to_string(),
        ));
    }

    info!("Starting linewatch v{}", env!("CARGO_PKG_VERSION"));

    let sport = Sport::from_str(&config.scanner.sport)?;
    let provider = build_provider(&config.feed, sport)?;

    let opportunity_log: Arc<dyn OpportunityLog> = match &config.detector.opportunity_log_path {
        Some(path) => Arc::new(JsonlOpportunityLog::new(path.as_str())),
        None => Arc::new(NullOpportunityLog),
    };
    let detector = Arc::new(ArbitrageDetector::new(
        ExecutionModel::new(&config.execution),
        opportunity_log,
        &config.detector,
    ));
    let scanner = Arc::new(DiscrepancyScanner::new(
        Arc::clone(&provider),
        detector,
        &config,
    )?);
    let verifier = Arc::new(FinalVerifier::new(provider, config.verification.clone()));

    let sinks: Vec<Arc<dyn AlertSink>> = if dry_run {
        info!("Dry run: alerts go to the log sink only");
        vec![Arc::new(LogAlertSink)]
    } else {
        build_sinks(&config.alerts)?
    };

    let metrics = Arc::new(Metrics::new());
    let monitor = Arc::new(Monitor::new(
        scanner,
        verifier,
        sinks,
        Arc::clone(&metrics),
        &config,
    ));

    // Spawn health server
    let health_handle = config.health_port.map(|port| {
        let state = AppState::new(
            Arc::clone(&monitor),
            Arc::clone(&metrics),
            config.scanner.scan_interval_secs,
        );
        let server = HealthServer::new(state, port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Health server error: {}", e);
            }
        })
    });

    monitor.start(config.scanner.game_ids.clone()).await;
    info!(
        "Watching {} games ({}). Press Ctrl+C to stop.",
        config.scanner.game_ids.len(),
        config.scanner.sport
    );

    shutdown_signal().await;
    info!("Shutting down");

    monitor.stop();
    tokio::time::sleep(Duration::from_secs(2)).await;
    if let Some(handle) = health_handle {
        handle.abort();
    }

    metrics.log_status().await;
    info!("Shutdown complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("linewatch={}", config.level)));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "linewatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false);
            if config.json {
                builder.json().init();
            } else {
                builder.init();
            }
            Some(guard)
        }
        None => {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false);
            if config.json {
                builder.json().init();
            } else {
                builder.init();
            }
            None
        }
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
